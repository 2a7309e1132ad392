pub mod canvas;
pub mod input;
pub mod notify;
pub mod scene;
pub mod surface;
pub mod terminal;
