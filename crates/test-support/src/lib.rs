pub mod fixtures {
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};

    pub fn root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("tests")
            .join("fixtures")
    }

    pub fn path(relative: impl AsRef<Path>) -> PathBuf {
        root().join(relative.as_ref())
    }

    pub fn read(relative: impl AsRef<Path>) -> io::Result<String> {
        fs::read_to_string(path(relative))
    }

    /// Raw text of a recorded socket frame under `wire/`.
    pub fn wire(name: &str) -> String {
        read_or_panic(Path::new("wire").join(name))
    }

    /// The `data` member of a recorded socket frame.
    pub fn wire_data(name: &str) -> serde_json::Value {
        let frame: serde_json::Value = serde_json::from_str(&wire(name))
            .unwrap_or_else(|error| panic!("fixture wire/{name} is not json: {error}"));
        frame
            .get("data")
            .cloned()
            .unwrap_or(serde_json::Value::Null)
    }

    pub fn config(name: &str) -> String {
        read_or_panic(Path::new("config").join(name))
    }

    fn read_or_panic(relative: impl AsRef<Path>) -> String {
        let relative = relative.as_ref();
        read(relative).unwrap_or_else(|error| {
            panic!(
                "failed to read fixture {}: {error}",
                relative.to_string_lossy()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures;

    #[test]
    fn fixture_root_exists() {
        assert!(fixtures::root().is_dir());
    }

    #[test]
    fn loads_wire_fixture() {
        let frame = fixtures::wire("chat-message-new.json");
        let json: serde_json::Value =
            serde_json::from_str(&frame).expect("chat-message-new.json should be valid json");
        assert_eq!(json["event"], "chatMessageNew");
    }

    #[test]
    fn wire_data_extracts_payload() {
        let data = fixtures::wire_data("notification-order-received.json");
        assert_eq!(data["type"], "order_received");
    }

    #[test]
    fn loads_config_fixture() {
        let config = fixtures::config("minimal-config.toml");
        let toml: toml::Value =
            toml::from_str(&config).expect("minimal-config.toml should be valid toml");
        assert!(toml.is_table());
    }
}
