use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};

use super::constants::{DEFAULT_MAX_HALF_CRU_BYTES, DEFAULT_PAGE_SIZE};
use super::error::ConfigError;

const RAW_FILE_PREFIX: &str = "trd_cru_";
const RAW_FILE_EXTENSION: &str = ".raw";

/// Version of the link payload layout.
///
/// Run3 streams carry an extra TrackletHCHeader word in front of the DigitHCHeader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatVersion {
    Run2,
    #[default]
    Run3,
}

impl FormatVersion {
    pub fn has_tracklet_hc_header(&self) -> bool {
        matches!(self, Self::Run3)
    }

    /// Number of 32 bit words between the tracklet end marker and the first digit MCM header
    pub fn hc_header_words(&self) -> usize {
        match self {
            Self::Run2 => 2,
            Self::Run3 => 3,
        }
    }
}

impl Display for FormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Run2 => write!(f, "run2"),
            Self::Run3 => write!(f, "run3"),
        }
    }
}

/// The front end parameters the codec needs. Built once from a Config and handed to the
/// reader and encoder constructors; never modified afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeParams {
    pub format: FormatVersion,
    pub max_half_cru_bytes: usize,
    pub page_size: usize,
    pub keep_compressed_digits: bool,
    pub skip_empty_half_crus: bool,
}

impl Default for FeeParams {
    fn default() -> Self {
        Self {
            format: FormatVersion::default(),
            max_half_cru_bytes: DEFAULT_MAX_HALF_CRU_BYTES,
            page_size: DEFAULT_PAGE_SIZE,
            keep_compressed_digits: false,
            skip_empty_half_crus: false,
        }
    }
}

/// Structure representing the application configuration. Contains pathing and codec information
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub raw_path: PathBuf,
    pub output_path: PathBuf,
    pub format: FormatVersion,
    pub max_half_cru_bytes: usize,
    pub page_size: usize,
    pub keep_compressed_digits: bool,
    pub reencode: bool,
    pub skip_empty_half_crus: bool,
    pub n_threads: i32,
}

impl Default for Config {
    /// Generate a new Config object. Paths will be empty/invalid
    fn default() -> Self {
        Self {
            raw_path: PathBuf::from("None"),
            output_path: PathBuf::from("None"),
            format: FormatVersion::default(),
            max_half_cru_bytes: DEFAULT_MAX_HALF_CRU_BYTES,
            page_size: DEFAULT_PAGE_SIZE,
            keep_compressed_digits: false,
            reencode: false,
            skip_empty_half_crus: false,
            n_threads: 1,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Get all of the raw files in the raw directory, sorted by name
    pub fn get_raw_files(&self) -> Result<Vec<PathBuf>, ConfigError> {
        if !self.raw_path.exists() {
            return Err(ConfigError::BadFilePath(self.raw_path.clone()));
        }
        let mut file_list: Vec<PathBuf> = Vec::new();
        for item in self.raw_path.read_dir()? {
            let item_path = item?.path();
            let is_raw = item_path
                .file_name()
                .map(|name| name.to_string_lossy())
                .is_some_and(|name| {
                    name.starts_with(RAW_FILE_PREFIX) && name.ends_with(RAW_FILE_EXTENSION)
                });
            if is_raw {
                file_list.push(item_path);
            }
        }

        if file_list.is_empty() {
            return Err(ConfigError::NoMatchingFiles(self.raw_path.clone()));
        }
        file_list.sort();
        Ok(file_list)
    }

    /// Get the directory re-encoded files are written to, creating it if needed
    pub fn get_output_directory(&self) -> Result<&Path, ConfigError> {
        if !self.output_path.exists() {
            std::fs::create_dir_all(&self.output_path)?;
        }
        Ok(&self.output_path)
    }

    pub fn fee_params(&self) -> FeeParams {
        FeeParams {
            format: self.format,
            max_half_cru_bytes: self.max_half_cru_bytes,
            page_size: self.page_size,
            keep_compressed_digits: self.keep_compressed_digits,
            skip_empty_half_crus: self.skip_empty_half_crus,
        }
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }

    pub fn need_reencode(&self) -> bool {
        self.reencode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_yaml_round_trip() {
        let mut config = Config::default();
        config.format = FormatVersion::Run2;
        config.n_threads = 4;
        let yaml_str = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml_str).unwrap();
        assert_eq!(parsed.format, FormatVersion::Run2);
        assert_eq!(parsed.n_threads, 4);
        assert_eq!(parsed.fee_params(), config.fee_params());
    }

    #[test]
    fn test_raw_file_listing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("trd_cru_1_c_run3.raw"), b"").unwrap();
        std::fs::write(dir.path().join("trd_cru_0_a_run3.raw"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        let config = Config {
            raw_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let files = config.get_raw_files().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("trd_cru_0_a_run3.raw"));

        let empty = tempfile::tempdir().unwrap();
        let config = Config {
            raw_path: empty.path().to_path_buf(),
            ..Default::default()
        };
        assert!(matches!(
            config.get_raw_files(),
            Err(ConfigError::NoMatchingFiles(_))
        ));
    }

    #[test]
    fn test_format_version_words() {
        assert_eq!(FormatVersion::Run2.hc_header_words(), 2);
        assert_eq!(FormatVersion::Run3.hc_header_words(), 3);
        assert!(!FormatVersion::Run2.has_tracklet_hc_header());
        assert_eq!(FormatVersion::Run3.to_string(), "run3");
    }
}
