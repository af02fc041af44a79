//! Key generation for funding accounts.
//!
//! Prints TOML the run command and operators can paste into configs:
//!
//! ```toml
//! [[keys]]
//! address = "3b6a27bc..."
//! seed = "9d61b19d..."
//! ```

use std::fmt::{self, Write};
use surge_types::KeyPair;

/// Generate `count` fresh keypairs formatted as TOML.
pub fn generate_keys_toml(count: usize) -> Result<String, fmt::Error> {
    let keys: Vec<KeyPair> = (0..count).map(|_| KeyPair::generate()).collect();
    format_keys_toml(&keys)
}

/// Format keypairs as `[[keys]]` tables.
pub fn format_keys_toml(keys: &[KeyPair]) -> Result<String, fmt::Error> {
    let mut output = String::new();
    writeln!(output, "# Generated surge keys: {} total", keys.len())?;
    writeln!(output)?;

    for key in keys {
        writeln!(output, "[[keys]]")?;
        writeln!(output, "address = \"{}\"", key.address())?;
        writeln!(output, "seed = \"{}\"", key.seed_hex())?;
        writeln!(output)?;
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct KeyFile {
        keys: Vec<KeyEntry>,
    }

    #[derive(Deserialize)]
    struct KeyEntry {
        address: String,
        seed: String,
    }

    #[test]
    fn test_keys_toml_parses_back() {
        let keys = vec![KeyPair::from_seed(&[1; 32]), KeyPair::from_seed(&[2; 32])];
        let toml_str = format_keys_toml(&keys).unwrap();

        let parsed: KeyFile = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.keys.len(), 2);
        for (entry, key) in parsed.keys.iter().zip(&keys) {
            assert_eq!(entry.address, key.address().as_str());
            let restored = KeyPair::from_seed_hex(&entry.seed).unwrap();
            assert_eq!(restored.address(), key.address());
        }
    }

    #[test]
    fn test_generated_keys_are_distinct() {
        let toml_str = generate_keys_toml(3).unwrap();
        let parsed: KeyFile = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.keys.len(), 3);
        assert_ne!(parsed.keys[0].address, parsed.keys[1].address);
    }
}
