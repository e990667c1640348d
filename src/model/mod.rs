pub mod attendance;
pub mod enrollment;
pub mod holiday;
pub mod school_year;
