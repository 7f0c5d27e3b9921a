pub mod cache;
pub mod chart;
pub mod note;
pub mod note_data;
pub mod timing;
pub mod transform;
