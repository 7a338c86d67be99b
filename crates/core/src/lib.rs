pub mod capture;
pub mod clock;
pub mod combat;
pub mod context;
pub mod cooldown;
pub mod detector;
pub mod hint;
pub mod logger;
pub mod matcher;
pub mod navigation;
pub mod orchestrator;
pub mod platform;
pub mod position;
pub mod profile;
pub mod settings;
pub mod template;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;
