pub mod backend;
pub mod inference;
pub mod labels;
pub mod model_manager;
