//! Persisted Wi-Fi credentials.
//!
//! Image layout: `ssid[32] ‖ password[64] ‖ checksum`, where the checksum is
//! the byte sum of both fields modulo 256. Each field must contain a NUL.

use crate::error::StorageError;

pub const MAX_SSID_LENGTH: usize = 32;
pub const MAX_PASSWORD_LENGTH: usize = 64;
pub const IMAGE_SIZE: usize = MAX_SSID_LENGTH + MAX_PASSWORD_LENGTH + 1;

/// Non-volatile backend (EEPROM emulation, flash sector, ...).
pub trait ConfigStore {
    fn read_image(&mut self, buf: &mut [u8; IMAGE_SIZE]) -> Result<(), StorageError>;
    fn write_image(&mut self, image: &[u8; IMAGE_SIZE]) -> Result<(), StorageError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WifiConfig {
    ssid: [u8; MAX_SSID_LENGTH],
    password: [u8; MAX_PASSWORD_LENGTH],
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self::empty()
    }
}

impl WifiConfig {
    pub const fn empty() -> Self {
        Self {
            ssid: [0; MAX_SSID_LENGTH],
            password: [0; MAX_PASSWORD_LENGTH],
        }
    }

    /// Fails when either string leaves no room for its terminator.
    pub fn new(ssid: &str, password: &str) -> Result<Self, StorageError> {
        let mut cfg = Self::empty();
        copy_field(&mut cfg.ssid, ssid.as_bytes())?;
        copy_field(&mut cfg.password, password.as_bytes())?;
        Ok(cfg)
    }

    pub fn ssid(&self) -> &[u8] {
        until_nul(&self.ssid)
    }

    pub fn password(&self) -> &[u8] {
        until_nul(&self.password)
    }

    pub fn is_empty(&self) -> bool {
        self.ssid().is_empty()
    }

    pub fn checksum(&self) -> u8 {
        self.ssid
            .iter()
            .chain(self.password.iter())
            .fold(0u8, |sum, b| sum.wrapping_add(*b))
    }

    pub fn encode(&self) -> [u8; IMAGE_SIZE] {
        let mut image = [0u8; IMAGE_SIZE];
        image[..MAX_SSID_LENGTH].copy_from_slice(&self.ssid);
        image[MAX_SSID_LENGTH..IMAGE_SIZE - 1].copy_from_slice(&self.password);
        image[IMAGE_SIZE - 1] = self.checksum();
        image
    }

    /// Checksum is verified first, then field termination.
    pub fn decode(image: &[u8; IMAGE_SIZE]) -> Result<Self, StorageError> {
        let mut cfg = Self::empty();
        cfg.ssid.copy_from_slice(&image[..MAX_SSID_LENGTH]);
        cfg.password
            .copy_from_slice(&image[MAX_SSID_LENGTH..IMAGE_SIZE - 1]);

        let stored = image[IMAGE_SIZE - 1];
        let computed = cfg.checksum();
        if stored != computed {
            return Err(StorageError::ChecksumMismatch { stored, computed });
        }
        if !cfg.ssid.contains(&0) || !cfg.password.contains(&0) {
            return Err(StorageError::Unterminated);
        }
        Ok(cfg)
    }

    /// Loads the stored config, or an empty one if the image is unusable.
    pub fn load<S: ConfigStore>(store: &mut S) -> Self {
        let mut image = [0u8; IMAGE_SIZE];
        let result = store
            .read_image(&mut image)
            .and_then(|()| Self::decode(&image));
        match result {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!("wifi config reset: {}", err);
                Self::empty()
            }
        }
    }

    pub fn save<S: ConfigStore>(&self, store: &mut S) -> Result<(), StorageError> {
        store.write_image(&self.encode())?;
        debug!("wifi config saved");
        Ok(())
    }
}

fn copy_field(field: &mut [u8], src: &[u8]) -> Result<(), StorageError> {
    if src.len() >= field.len() || src.contains(&0) {
        return Err(StorageError::FieldTooLong);
    }
    field[..src.len()].copy_from_slice(src);
    Ok(())
}

fn until_nul(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RamStore {
        image: [u8; IMAGE_SIZE],
        fail: bool,
    }

    impl RamStore {
        fn blank(fill: u8) -> Self {
            Self {
                image: [fill; IMAGE_SIZE],
                fail: false,
            }
        }
    }

    impl ConfigStore for RamStore {
        fn read_image(&mut self, buf: &mut [u8; IMAGE_SIZE]) -> Result<(), StorageError> {
            if self.fail {
                return Err(StorageError::Backend);
            }
            *buf = self.image;
            Ok(())
        }

        fn write_image(&mut self, image: &[u8; IMAGE_SIZE]) -> Result<(), StorageError> {
            if self.fail {
                return Err(StorageError::Backend);
            }
            self.image = *image;
            Ok(())
        }
    }

    #[test]
    fn test_save_then_load() {
        let mut store = RamStore::blank(0xFF);
        let cfg = WifiConfig::new("quadnet", "hunter22").unwrap();
        cfg.save(&mut store).unwrap();

        let loaded = WifiConfig::load(&mut store);
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.ssid(), b"quadnet");
        assert_eq!(loaded.password(), b"hunter22");
    }

    #[test]
    fn test_checksum_is_byte_sum() {
        let cfg = WifiConfig::new("ab", "c").unwrap();
        assert_eq!(cfg.checksum(), b'a'.wrapping_add(b'b').wrapping_add(b'c'));
        let image = cfg.encode();
        assert_eq!(image[IMAGE_SIZE - 1], cfg.checksum());
    }

    #[test]
    fn test_corrupted_image_resets() {
        let mut store = RamStore::blank(0);
        WifiConfig::new("net", "pw").unwrap().save(&mut store).unwrap();
        store.image[1] ^= 0x01;

        let err = WifiConfig::decode(&store.image).unwrap_err();
        assert!(matches!(err, StorageError::ChecksumMismatch { .. }));
        assert!(WifiConfig::load(&mut store).is_empty());
    }

    #[test]
    fn test_unterminated_field_resets() {
        // Erased flash: all 0xFF, checksum byte happens to match
        let mut image = [0xFFu8; IMAGE_SIZE];
        let sum = image[..IMAGE_SIZE - 1]
            .iter()
            .fold(0u8, |s, b| s.wrapping_add(*b));
        image[IMAGE_SIZE - 1] = sum;
        assert_eq!(WifiConfig::decode(&image), Err(StorageError::Unterminated));
    }

    #[test]
    fn test_field_limits() {
        let long = [b'a'; MAX_SSID_LENGTH];
        let ssid_31 = core::str::from_utf8(&long[..31]).unwrap();
        let ssid_32 = core::str::from_utf8(&long).unwrap();
        assert!(WifiConfig::new(ssid_31, "").is_ok());
        assert_eq!(WifiConfig::new(ssid_32, ""), Err(StorageError::FieldTooLong));
    }

    #[test]
    fn test_backend_failure_loads_empty() {
        let mut store = RamStore::blank(0);
        store.fail = true;
        assert!(WifiConfig::load(&mut store).is_empty());
        assert_eq!(
            WifiConfig::empty().save(&mut store),
            Err(StorageError::Backend)
        );
    }
}
