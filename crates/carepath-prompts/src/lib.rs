pub mod error;
pub mod registry;
pub mod reload;
pub mod template;

pub use error::PromptError;
pub use registry::PromptRegistry;
pub use reload::spawn_sighup_reload;
pub use template::Template;
