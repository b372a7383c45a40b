//! Decryption of `ENC(...)` configuration values.

use std::sync::Arc;

use crate::error::ProviderError;
use crate::properties::Properties;

/// Registry type tag of [`StringEncryptor`] providers.
pub const STRING_ENCRYPTOR_TYPE: &str = "StringEncryptor";
/// Configuration key naming the encryptor alias to use.
pub const DECRYPTOR_KEY: &str = "decryptor";
/// Service property an encryptor is published with to be selected by alias.
pub const ALIAS_KEY: &str = "alias";

const ENCRYPTED_PREFIX: &str = "ENC(";
const ENCRYPTED_SUFFIX: &str = ")";

/// Turns ciphertext back into the configured value.
pub trait StringEncryptor: Send + Sync + 'static {
    fn decrypt(&self, ciphertext: &str) -> Result<String, ProviderError>;
}

/// Ciphertext of `value` when it has the `ENC(...)` form.
pub fn ciphertext(value: &str) -> Option<&str> {
    value
        .trim()
        .strip_prefix(ENCRYPTED_PREFIX)?
        .strip_suffix(ENCRYPTED_SUFFIX)
}

/// Rewrites encrypted values of a property map.
pub struct Decryptor {
    encryptor: Option<Arc<dyn StringEncryptor>>,
}

impl Decryptor {
    pub fn new(encryptor: Option<Arc<dyn StringEncryptor>>) -> Self {
        Self { encryptor }
    }

    /// True if any value of `props` is encrypted.
    pub fn is_encrypted(props: &Properties) -> bool {
        props.iter().any(|(_, v)| ciphertext(v).is_some())
    }

    /// Alias of the encryptor `props` asks for, if any.
    pub fn alias(props: &Properties) -> Option<&str> {
        props.get_trimmed(DECRYPTOR_KEY)
    }

    /// Copy of `props` with every `ENC(...)` value decrypted.
    ///
    /// ### Errors
    /// [`ProviderError::Construction`] when a value is encrypted but no
    /// encryptor was supplied, or the encryptor rejects the ciphertext.
    pub fn decrypt(&self, props: &Properties) -> Result<Properties, ProviderError> {
        let mut out = Properties::new();
        for (key, value) in props.iter() {
            let plain = match ciphertext(value) {
                None => value.to_string(),
                Some(cipher) => {
                    let encryptor = self.encryptor.as_ref().ok_or_else(|| {
                        ProviderError::construction(format!(
                            "value of '{key}' is encrypted but no encryptor is available"
                        ))
                    })?;
                    encryptor.decrypt(cipher)?
                }
            };
            out.insert(key, plain);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ReversingEncryptor;

    #[test]
    fn test_ciphertext_form() {
        assert_eq!(ciphertext("ENC(abc)"), Some("abc"));
        assert_eq!(ciphertext(" ENC() "), Some(""));
        assert_eq!(ciphertext("ENC(abc"), None);
        assert_eq!(ciphertext("abc"), None);
    }

    #[test]
    fn test_decrypts_only_encrypted_values() {
        let props = Properties::new()
            .with("url", "tcp://broker")
            .with(".password", "ENC(terces)")
            .with(DECRYPTOR_KEY, "main");
        assert!(Decryptor::is_encrypted(&props));
        assert_eq!(Decryptor::alias(&props), Some("main"));

        let plain = Decryptor::new(Some(Arc::new(ReversingEncryptor)))
            .decrypt(&props)
            .unwrap();
        assert_eq!(plain.get(".password"), Some("secret"));
        assert_eq!(plain.get("url"), Some("tcp://broker"));
        assert!(!Decryptor::is_encrypted(&plain));
    }

    #[test]
    fn test_missing_encryptor_is_a_construction_error() {
        let props = Properties::new().with("password", "ENC(x)");
        let err = Decryptor::new(None).decrypt(&props).unwrap_err();
        assert_eq!(err.as_label(), "provider_construction");

        let clear = Properties::new().with("password", "x");
        assert_eq!(Decryptor::new(None).decrypt(&clear).unwrap(), clear);
    }
}
