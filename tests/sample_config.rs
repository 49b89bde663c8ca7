//! The shipped example configuration must always load cleanly.

#[test]
fn example_config_loads_and_validates() {
    let config = svrun_config::from_path(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/svrun.toml"))
        .expect("example config must validate");

    assert_eq!(config.default_simulator, "verilator");
    assert_eq!(config.tests.len(), 3);

    let enabled: Vec<_> = config.enabled_tests().map(|t| t.name.as_str()).collect();
    assert_eq!(enabled, ["counter", "tx_ffe"]);

    let pll = config.test("pll_lock").unwrap();
    assert_eq!(pll.simulator.as_deref(), Some("vcs"));
    assert!(!pll.enabled);
}
