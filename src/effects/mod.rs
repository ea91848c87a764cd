//! User-authored effect definitions.
//!
//! Effects are JSON documents stamped with a `save_format`. Loading checks
//! the format, upgrades older documents in memory and validates the result
//! against an explicit checklist before anything is handed out.

mod error;
mod schema;
mod store;
mod upgrade;
mod validate;

pub use error::{LoadError, StoreError};
pub use schema::{
    EffectDefinition, EffectKind, EffectMeta, EffectType, Frame, Layer, LayeredPayload,
    SAVE_FORMAT, ScriptParameter, ScriptedPayload, SequencePayload,
};
pub use store::{EffectFileManager, EffectListing, SCRIPT_EXTENSION, safe_filename, script_path};
pub use upgrade::upgrade as upgrade_value;
pub use validate::validate as validate_value;
