//! DRM/KMS mode setting

pub mod catalog;
pub mod device;
pub mod display;
pub mod error;
pub mod fallback;
pub mod mode;
pub mod resolver;

pub use catalog::{ConnectorSnapshot, EncoderSnapshot, ResourceCatalog};
pub use device::{Device, DeviceId};
pub use display::{commit, validate, ModesetTarget, SavedCrtc, Scanout};
pub use error::{KmsError, KmsResult};
pub use fallback::{apply_fallback, FallbackOutcome, FallbackPolicy, FallbackReport};
pub use mode::{describe, mode_name, FallbackMode, ModeRequest};
pub use resolver::{CrtcPolicy, ModeResolver, ResolvedConfiguration};
