pub mod grade;

pub use grade::AppState;
