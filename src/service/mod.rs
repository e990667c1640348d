pub mod attendance;
pub mod calendar;
pub mod catch_up;
pub mod reconciler;
pub mod resolver;
pub mod status;
