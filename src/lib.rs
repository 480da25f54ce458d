//! kmsmode - query and set display modes on Linux KMS
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │   CLI (list / set / fallback)            │
//! ├──────────────────────────────────────────┤
//! │   Device  →  ResourceCatalog snapshot    │
//! │                    ↓                     │
//! │   ModeResolver / FallbackPolicy          │
//! │                    ↓                     │
//! │   commit  →  SETCRTC + Scanout           │
//! └──────────────────────────────────────────┘
//! ```

pub mod config;
pub mod constants;
pub mod kms;

pub use config::Config;
