//! Cross-module flows; unit tests live next to their modules.

mod semantic;
mod sync;
