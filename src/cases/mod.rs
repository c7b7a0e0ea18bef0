//! Case opening: catalog, randomness, weighted draws and the spin state machine

pub mod catalog;
pub mod draw;
pub mod random;
pub mod session;
pub mod types;
pub mod vrf_engine;

pub use catalog::CaseCatalog;
pub use draw::{Draw, DrawEngine};
pub use random::{DrawContext, OsRandomSource, RandomSource, Roll};
pub use session::{SessionRegistry, SessionSnapshot, SpinPhase, SpinSession};
pub use types::{AccountId, Case, CaseId, Item, ItemId, PaymentMethod, Rarity, SpinResult, VRFBundle};
pub use vrf_engine::VrfRandomSource;
