//! Shared fixtures: a plugin directory on disk and a few services.

#![allow(dead_code)]

use async_trait::async_trait;
use bolge::bolge_config::Settings;
use bolge::bolge_core::Error;
use bolge::*;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const SETTINGS: &str = r#"
plugin:
  name: Shop
  version: 2
features: [cart, wishlist]
"#;

pub const ROUTES: &str = r#"
home:
  path: /shop
  controller: app.greeter::index

greet:
  path: /shop/hello/{name}
  controller: app.greeter::hello
  defaults: { name: world }

checkout:
  path: /shop/checkout
  controller: app.greeter::index
  methods: POST

broken:
  path: /shop/broken
  controller: app.greeter::broken

ghost:
  path: /shop/ghost
  controller: app.ghost

fallback:
  path: /shop/default
  controller: bolge.default_controller
"#;

pub const SERVICES: &str = r#"
parameters:
  greeting: Hello

services:
  app.greeter:
    class: App\Greeter
    arguments: ['%greeting%', '%core.settings%']
"#;

/// A plugin directory with settings, routes and services in place
pub struct PluginDir {
    dir: TempDir,
}

impl PluginDir {
    pub fn new() -> Self {
        let plugin = Self {
            dir: TempDir::new().unwrap(),
        };
        plugin.write("config/settings.yaml", SETTINGS);
        plugin.write("config/routes.yaml", ROUTES);
        plugin.write("config/services.yaml", SERVICES);
        plugin
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, file: &str, content: &str) {
        let path = self.dir.path().join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn remove(&self, file: &str) {
        fs::remove_file(self.dir.path().join(file)).unwrap();
    }

    /// A context over this directory with the test classes registered
    pub fn core(&self) -> BolgeCore {
        let mut core = BolgeCore::new();
        core.set_dir_path(self.path());
        register_greeter(&mut core);
        core
    }
}

/// Controller answering `index`, `hello` and failing on `broken`
pub struct Greeter {
    greeting: String,
    plugin: String,
}

#[async_trait]
impl Controller for Greeter {
    async fn call(&self, action: Option<&str>, request: HttpRequest) -> Result<HttpResponse, Error> {
        match action {
            Some("index") => Ok(HttpResponse::text(format!("{} home", self.plugin))),
            Some("hello") => {
                let name = request.param("name").unwrap_or_default();
                Ok(HttpResponse::text(format!("{} {} from {}", self.greeting, name, self.plugin)))
            }
            Some("broken") => Err(Error::Internal("database exploded".into())),
            other => Err(Error::NotFound(format!("action {:?}", other))),
        }
    }
}

pub fn register_greeter(core: &mut BolgeCore) {
    core.register_controller("App\\Greeter", |args| {
        let settings = args.get::<Settings>(1)?;
        let plugin = settings
            .path("plugin.name")
            .and_then(|v| v.as_str())
            .unwrap_or("?")
            .to_string();
        Ok(Arc::new(Greeter {
            greeting: args.str(0)?,
            plugin,
        }) as Arc<dyn Controller>)
    });
}

/// Records the lifecycle events it sees
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<String>>,
    statuses: Mutex<Vec<Option<u16>>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn boot_statuses(&self) -> Vec<Option<u16>> {
        self.statuses.lock().unwrap().clone()
    }

    fn record(&self, name: &str) {
        self.events.lock().unwrap().push(name.to_string());
    }
}

#[async_trait]
impl EventHandler<PreHandleEvent> for Recorder {
    async fn handle(&self, event: &PreHandleEvent) -> Result<(), EventHandlerError> {
        self.record(event.event_name());
        Ok(())
    }
}

#[async_trait]
impl EventHandler<BootEvent> for Recorder {
    async fn handle(&self, event: &BootEvent) -> Result<(), EventHandlerError> {
        self.record(event.event_name());
        self.statuses
            .lock()
            .unwrap()
            .push(event.response().map(|r| r.status));
        Ok(())
    }
}

#[async_trait]
impl EventHandler<ActivateEvent> for Recorder {
    async fn handle(&self, event: &ActivateEvent) -> Result<(), EventHandlerError> {
        self.record(event.event_name());
        Ok(())
    }
}

impl EventSubscriber for Recorder {
    fn subscribe(self: Arc<Self>, dispatcher: &EventDispatcher) {
        dispatcher.subscribe::<PreHandleEvent, _>(Arc::clone(&self));
        dispatcher.subscribe::<BootEvent, _>(Arc::clone(&self));
        dispatcher.subscribe::<ActivateEvent, _>(self);
    }
}
