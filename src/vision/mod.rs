pub mod detection;
pub mod oracle;
pub mod template;

pub use detection::Detection;
pub use oracle::{ScreenOracle, VisionOracle};
