// Configuration loading for Bolge plugins
//
// Everything a plugin directory provides: `.env`, `config/settings.yaml`,
// `config/routes.yaml` and `config/services.yaml`.

pub mod env;
pub mod error;
pub mod loader;
pub mod routes;
pub mod services;
pub mod settings;

pub use env::Environment;
pub use error::{ConfigError, Result};
pub use loader::{FileLocator, parse_yaml, read_yaml, yaml_to_json};
pub use routes::YamlRouteLoader;
pub use services::YamlServiceLoader;
pub use settings::Settings;
