use std::{collections::HashSet, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    distance::DistanceKind,
    error::{Error, Result},
    keyword::{DEFAULT_KEYWORDS_FIELD, DEFAULT_RELEVANCE_FIELD, KeywordBinding},
    tokenizer::StemmerKind,
};

/// A record field to index and the weight of every keyword found in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub weight: f64,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }

    /// Parse `name:weight`.
    ///
    /// # Examples
    ///
    /// ```
    /// use keyrank::config::FieldSpec;
    ///
    /// let spec = FieldSpec::parse("title:100").unwrap();
    /// assert_eq!(spec, FieldSpec::new("title", 100.0));
    /// assert!(FieldSpec::parse("title").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let (name, weight) = s.rsplit_once(':').ok_or_else(|| {
            Error::Config(format!("expected name:weight, got '{s}'"))
        })?;
        let weight = weight.trim().parse().map_err(|_| {
            Error::Config(format!("invalid weight in field spec '{s}'"))
        })?;
        Ok(Self::new(name.trim(), weight))
    }
}

fn default_keywords_field() -> String {
    DEFAULT_KEYWORDS_FIELD.to_string()
}

fn default_relevance_field() -> String {
    DEFAULT_RELEVANCE_FIELD.to_string()
}

/// Indexing configuration, fixed once an indexer is built.
///
/// Stored as `config.json` in the data directory:
///
/// ```json
/// {
///   "stemmer": "english",
///   "distance": "jaro-winkler",
///   "fields": [{"name": "title", "weight": 100}],
///   "keywordsField": "_keywords",
///   "relevanceField": "_relevance"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexConfig {
    #[serde(default)]
    pub stemmer: StemmerKind,
    #[serde(default)]
    pub distance: DistanceKind,
    pub fields: Vec<FieldSpec>,
    #[serde(default = "default_keywords_field")]
    pub keywords_field: String,
    #[serde(default = "default_relevance_field")]
    pub relevance_field: String,
}

impl IndexConfig {
    /// Configuration with default stemmer, distance and attribute names.
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self {
            stemmer: StemmerKind::default(),
            distance: DistanceKind::default(),
            fields,
            keywords_field: default_keywords_field(),
            relevance_field: default_relevance_field(),
        }
    }

    pub fn binding(&self) -> KeywordBinding {
        KeywordBinding::new(&self.keywords_field, &self.relevance_field)
    }

    /// Check field specs and attribute names.
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(Error::Config("no fields configured for indexing".into()));
        }
        if self.keywords_field.is_empty() || self.relevance_field.is_empty() {
            return Err(Error::Config("attribute names must not be empty".into()));
        }
        if self.keywords_field == self.relevance_field {
            return Err(Error::Config(format!(
                "keywords and relevance attributes share the name '{}'",
                self.keywords_field
            )));
        }

        let binding = self.binding();
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(Error::Config("field name must not be empty".into()));
            }
            if binding.is_reserved(&field.name) {
                return Err(Error::Config(format!(
                    "field '{}' collides with a reserved attribute",
                    field.name
                )));
            }
            if !(field.weight.is_finite() && field.weight > 0.0) {
                return Err(Error::Config(format!(
                    "field '{}' needs a positive weight, got {}",
                    field.name, field.weight
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Error::Config(format!(
                    "field '{}' is configured twice",
                    field.name
                )));
            }
        }
        Ok(())
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound {
                    kind: "configuration",
                    name: path.display().to_string(),
                }
            } else {
                Error::Io(e)
            }
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate and write the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
