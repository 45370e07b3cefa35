pub mod capture;
pub mod continuous;
pub mod recording;
