//! Environment overrides on top of a config file
//!
//! Kept in its own test binary since it mutates the process environment.

use std::io::Write;
use tessera_app::AppConfig;

#[test]
fn test_environment_overrides_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[chain]
chain_id = "from-file"
tx_gas_limit = 5000

[logging]
level = "debug"
"#
    )
    .unwrap();

    std::env::set_var("TESSERA__CHAIN__CHAIN_ID", "from-env");
    let config = AppConfig::load(file.path());
    std::env::remove_var("TESSERA__CHAIN__CHAIN_ID");

    let config = config.unwrap();
    assert_eq!(config.chain.chain_id, "from-env");
    assert_eq!(config.chain.tx_gas_limit, 5_000);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.dnr.epoch_identifier, "week");
}
