#[cfg(test)]
pub mod test {
    use std::path::PathBuf;

    use serde::{Deserialize, Serialize};
    use toml::{Table, Value};

    use crate::bundle::{Bundle, BundleMeta, Shared};
    use crate::describe::{Schema, Section};
    use crate::serializer::{ExternalSerializer, SelfSerializing, SerializerError};
    use crate::version::Version;

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Server {
        pub host: String,
        pub port: u16,
        pub tags: Vec<String>,
    }

    impl Section for Server {
        fn declare(schema: &mut Schema<Self>) {
            schema.value("host", |s| &mut s.host).comment("Address to bind.");
            schema.value("port", |s| &mut s.port);
            schema.value("tags", |s| &mut s.tags);
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct Plugin {
        pub name: String,
        pub enabled: bool,
        pub weight: f64,
    }

    impl Default for Plugin {
        fn default() -> Self {
            Self {
                name: String::new(),
                enabled: false,
                weight: 1.0,
            }
        }
    }

    impl Section for Plugin {
        fn declare(schema: &mut Schema<Self>) {
            schema.value("name", |p| &mut p.name);
            schema.value("enabled", |p| &mut p.enabled);
            schema.value("weight", |p| &mut p.weight);
        }
    }

    /// Root bundle covering leaves, nested sections and section lists.
    #[derive(Debug, Clone)]
    pub struct AppSettings {
        pub meta: BundleMeta,
        pub name: String,
        pub retries: u32,
        pub ratio: f32,
        pub slots: [i32; 5],
        pub nickname: Option<String>,
        pub server: Server,
        pub plugins: Vec<Plugin>,
        pub scratch: String,
    }

    impl AppSettings {
        pub fn new(version: Version, location: impl Into<PathBuf>) -> Self {
            Self::with_meta(BundleMeta::new(version, location))
        }

        pub fn with_meta(meta: BundleMeta) -> Self {
            Self {
                meta,
                name: "demo".into(),
                retries: 3,
                ratio: 0.5,
                slots: [0; 5],
                nickname: None,
                server: Server {
                    host: "localhost".into(),
                    port: 8080,
                    tags: Vec::new(),
                },
                plugins: Vec::new(),
                scratch: String::new(),
            }
        }
    }

    impl Section for AppSettings {
        fn declare(schema: &mut Schema<Self>) {
            schema.value("name", |s| &mut s.name).comment("Display name.");
            schema.value("maxRetries", |s| &mut s.retries);
            schema.value("ratio", |s| &mut s.ratio);
            schema.value("slots", |s| &mut s.slots);
            schema
                .value("nickname", |s| &mut s.nickname)
                .path("display.nickname")
                .env("APP_NICKNAME");
            schema
                .section("server", |s| &mut s.server)
                .comment("Network settings.");
            schema.section_list("plugins", |s| &mut s.plugins);
            schema.value("scratch", |s| &mut s.scratch).ignore();
        }
    }

    impl Bundle for AppSettings {
        fn meta(&self) -> &BundleMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut BundleMeta {
            &mut self.meta
        }
    }

    // -- Opaque members --------------------------------------------------------

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Endpoint {
        pub url: String,
        pub timeout: u32,
    }

    /// RGB color stored as `hex = "#rrggbb"`.
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    pub struct Color {
        pub r: u8,
        pub g: u8,
        pub b: u8,
    }

    impl Color {
        fn to_table(self) -> Table {
            let mut table = Table::new();
            table.insert(
                "hex".into(),
                Value::String(format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)),
            );
            table
        }

        fn from_table(section: &Table) -> Result<Self, SerializerError> {
            let hex = section
                .get("hex")
                .and_then(Value::as_str)
                .and_then(|s| s.strip_prefix('#'))
                .filter(|s| s.len() == 6)
                .ok_or_else(|| SerializerError::new("expected hex = \"#rrggbb\""))?;
            let channel = |i: usize| {
                u8::from_str_radix(&hex[i..i + 2], 16)
                    .map_err(|e| SerializerError::new(e.to_string()))
            };
            Ok(Self {
                r: channel(0)?,
                g: channel(2)?,
                b: channel(4)?,
            })
        }
    }

    impl SelfSerializing for Color {
        fn to_section(&self) -> Result<Table, SerializerError> {
            Ok(self.to_table())
        }

        fn from_section(section: &Table) -> Result<Self, SerializerError> {
            Self::from_table(section)
        }
    }

    /// External serializer for [`Color`] with no default instance.
    pub struct ColorCodec;

    impl ExternalSerializer<Color> for ColorCodec {
        fn serialize(&self, value: &Color) -> Result<Table, SerializerError> {
            Ok(value.to_table())
        }

        fn deserialize(&self, section: &Table) -> Result<Color, SerializerError> {
            Color::from_table(section)
        }
    }

    #[derive(Debug, Default)]
    pub struct Extras {
        pub endpoint: Endpoint,
        pub backup: Option<Endpoint>,
        pub accent: Color,
    }

    impl Section for Extras {
        fn declare(schema: &mut Schema<Self>) {
            schema.custom("endpoint", |e| &mut e.endpoint);
            schema.optional_custom("backup", |e| &mut e.backup);
            schema.serializable("accent", |e| &mut e.accent);
        }
    }

    #[derive(Debug, Default)]
    pub struct Palette {
        pub primary: Option<Color>,
    }

    impl Section for Palette {
        fn declare(schema: &mut Schema<Self>) {
            schema.optional_custom("primary", |p| &mut p.primary);
        }
    }

    // -- Shared and self-referential sections ----------------------------------

    #[derive(Default)]
    pub struct Node {
        pub label: String,
        pub next: Option<Shared<Node>>,
    }

    impl Section for Node {
        fn declare(schema: &mut Schema<Self>) {
            schema.value("label", |n| &mut n.label);
            schema.optional_shared("next", |n| &mut n.next);
        }
    }

    /// One node reachable from two paths.
    pub struct Twins {
        pub left: Shared<Node>,
        pub right: Shared<Node>,
    }

    impl Section for Twins {
        fn declare(schema: &mut Schema<Self>) {
            schema.shared("a", |t| &mut t.left);
            schema.shared("b", |t| &mut t.right);
        }
    }

    pub struct Graph {
        pub meta: BundleMeta,
        pub head: Shared<Node>,
    }

    impl Graph {
        pub fn new(version: Version, location: impl Into<PathBuf>, head: Shared<Node>) -> Self {
            Self {
                meta: BundleMeta::new(version, location),
                head,
            }
        }
    }

    impl Section for Graph {
        fn declare(schema: &mut Schema<Self>) {
            schema.shared("head", |g| &mut g.head);
        }
    }

    impl Bundle for Graph {
        fn meta(&self) -> &BundleMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut BundleMeta {
            &mut self.meta
        }
    }

    #[test]
    fn app_settings_defaults() {
        let settings = AppSettings::new(Version::new(1, 0, 0), "app.toml");
        assert_eq!(settings.name, "demo");
        assert_eq!(settings.server.port, 8080);
        assert!(settings.plugins.is_empty());
    }

    #[test]
    fn color_round_trips_through_hex() {
        let color = Color { r: 1, g: 2, b: 255 };
        let table = color.to_section().unwrap();
        assert_eq!(table["hex"], Value::String("#0102ff".into()));
        assert_eq!(Color::from_section(&table).unwrap(), color);
    }
}
