pub mod engine;

pub use engine::{
    CharacterizationEngine, CharacterizationPoint, CharacterizationResult,
    MIN_CHARACTERIZATION_POINTS,
};
