use bindfig::{BindError, Bundle, BundleMeta, Document, MigrationChain, Schema, Section, Version};
use toml::Value;

pub const VERSION: Version = Version::new(1, 1, 0);

#[derive(Debug)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

impl Section for Server {
    fn declare(schema: &mut Schema<Self>) {
        schema.value("host", |s| &mut s.host).comment("Interface to listen on.");
        schema.value("port", |s| &mut s.port).env("DEMO_PORT");
    }
}

/// Settings for the demo application, stored in `demo.toml`.
#[derive(Debug)]
pub struct DemoSettings {
    pub meta: BundleMeta,
    pub greeting: String,
    pub verbose: bool,
    pub features: Vec<String>,
    pub server: Server,
}

impl DemoSettings {
    pub fn new() -> Self {
        Self {
            meta: BundleMeta::new(VERSION, "demo.toml"),
            greeting: "hello".into(),
            verbose: false,
            features: vec!["colors".into()],
            server: Server {
                host: "127.0.0.1".into(),
                port: 8080,
            },
        }
    }
}

impl Section for DemoSettings {
    fn declare(schema: &mut Schema<Self>) {
        schema
            .value("greeting", |s| &mut s.greeting)
            .comment("Printed on startup.")
            .env("HELLO");
        schema.value("verbose", |s| &mut s.verbose);
        schema.value("features", |s| &mut s.features);
        schema.section("server", |s| &mut s.server).comment("HTTP listener.");
    }
}

impl Bundle for DemoSettings {
    fn meta(&self) -> &BundleMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut BundleMeta {
        &mut self.meta
    }

    // 1.0.0 kept the port at the root.
    fn migrations(chain: &mut MigrationChain) -> Result<(), BindError> {
        chain.register(Version::new(1, 0, 0), |mut doc: Document, _| {
            doc.rename("port", "server.port")?;
            doc.set("Version", Value::String(VERSION.to_string()))?;
            Ok(doc)
        })
    }
}
