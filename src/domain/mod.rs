//! The bootstrap sub-protocols, each a single exchange with the controller.

pub mod discovery;
pub mod install;
pub mod ntp;
pub mod poll;
pub mod services;
pub mod submit;
pub mod topology;
