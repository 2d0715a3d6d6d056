pub mod guard;
pub mod launcher;
pub mod trigger;
