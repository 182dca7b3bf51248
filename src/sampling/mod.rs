// src/sampling/mod.rs
pub mod random;
pub mod design;

// Re-export commonly used types
pub use random::RandomVariateSource;
pub use design::{
    DesignKind,
    DesignMatrix,
    generate,
    uniform_design,
    latin_hypercube_design,
    centered_latin_hypercube_design,
};
