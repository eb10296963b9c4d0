//! Worker capability registry
//!
//! Capabilities are registered by name; the lifecycle manager hands a job to
//! the first enabled capability whose `matches` accepts it. The built-in
//! `template` capability renders fixed text templates and is configured from
//! the `[capabilities.template]` table.

use async_trait::async_trait;
use courier_core::{CourierConfig, CourierError, Job, JobListing, Result, WorkerCapability};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Name of the built-in template capability
pub const TEMPLATE_CAPABILITY: &str = "template";

/// Ordered set of enabled capabilities
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    ordered: Vec<Arc<dyn WorkerCapability>>,
    by_name: HashMap<String, Arc<dyn WorkerCapability>>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.ordered.iter().map(|c| c.name().to_string()))
            .finish()
    }
}

impl CapabilityRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the capabilities enabled in `config.lifecycle.capabilities`
    pub fn from_config(config: &CourierConfig) -> Result<Self> {
        let mut registry = Self::new();
        for name in &config.lifecycle.capabilities {
            let settings = config.capabilities.get(name);
            let capability: Arc<dyn WorkerCapability> = match name.as_str() {
                TEMPLATE_CAPABILITY => Arc::new(TemplateCapability::from_table(settings)?),
                other => {
                    return Err(CourierError::configuration(format!(
                        "Unknown capability '{other}'"
                    )))
                }
            };
            registry.register(capability)?;
        }
        Ok(registry)
    }

    /// Add a capability after the ones already registered
    pub fn register(&mut self, capability: Arc<dyn WorkerCapability>) -> Result<()> {
        let name = capability.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(CourierError::configuration(format!(
                "Capability '{name}' registered twice"
            )));
        }
        self.by_name.insert(name, capability.clone());
        self.ordered.push(capability);
        Ok(())
    }

    /// Look a capability up by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn WorkerCapability>> {
        self.by_name.get(name).cloned()
    }

    /// First capability that accepts the job
    pub fn select(&self, job: &Job, listing: &JobListing) -> Option<Arc<dyn WorkerCapability>> {
        self.ordered
            .iter()
            .find(|capability| capability.matches(job, listing))
            .cloned()
    }

    /// Registered names in dispatch order
    pub fn names(&self) -> Vec<String> {
        self.ordered.iter().map(|c| c.name().to_string()).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TemplateSettings {
    application: String,
    body: String,
    tags: Vec<String>,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            application: "Hi, I can take on \"{title}\" (job {job_id}) and will deliver through \
                          this channel."
                .to_string(),
            body: "Deliverable for \"{title}\" (job {job_id}).".to_string(),
            tags: Vec::new(),
        }
    }
}

/// Renders configured text templates.
///
/// Placeholders: `{job_id}`, `{title}`, `{creator}`, `{description}`.
#[derive(Debug, Clone)]
pub struct TemplateCapability {
    settings: TemplateSettings,
}

impl TemplateCapability {
    /// Capability with the default templates, accepting every job
    pub fn new() -> Self {
        Self {
            settings: TemplateSettings::default(),
        }
    }

    /// Capability configured from a `[capabilities.template]` table
    pub fn from_table(table: Option<&toml::Table>) -> Result<Self> {
        let settings = match table {
            None => TemplateSettings::default(),
            Some(table) => toml::Value::Table(table.clone()).try_into().map_err(|e| {
                CourierError::configuration(format!("Invalid [capabilities.template]: {e}"))
            })?,
        };
        Ok(Self { settings })
    }

    fn render(template: &str, job: &Job, listing: &JobListing) -> String {
        let title = if listing.title.is_empty() {
            job.title.as_str()
        } else {
            listing.title.as_str()
        };
        template
            .replace("{job_id}", &job.id.to_string())
            .replace("{title}", title)
            .replace("{creator}", job.creator.as_str())
            .replace("{description}", &listing.description)
    }
}

impl Default for TemplateCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerCapability for TemplateCapability {
    fn name(&self) -> &str {
        TEMPLATE_CAPABILITY
    }

    fn matches(&self, job: &Job, listing: &JobListing) -> bool {
        if self.settings.tags.is_empty() {
            return true;
        }
        job.tags
            .iter()
            .chain(listing.tags.iter())
            .any(|tag| self.settings.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
    }

    fn build_application_message(&self, job: &Job, listing: &JobListing) -> Result<String> {
        Ok(Self::render(&self.settings.application, job, listing))
    }

    async fn execute(&self, job: &Job, listing: &JobListing) -> Result<String> {
        Ok(Self::render(&self.settings.body, job, listing))
    }

    fn package_result(&self, job: &Job, _listing: &JobListing, result: &str) -> Result<String> {
        let packaged = serde_json::json!({
            "jobId": job.id.0,
            "capability": TEMPLATE_CAPABILITY,
            "result": result,
        });
        Ok(packaged.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_testkit::{test_signer, JobBuilder, ScriptedCapability};
    use courier_crypto::SigningCapability;

    fn job(tags: &[&str]) -> Job {
        JobBuilder::new(test_signer(9).address())
            .title("Discord bot")
            .tags(tags)
            .build()
    }

    #[test]
    fn test_template_rendering() {
        let capability = TemplateCapability::new();
        let job = job(&[]);
        let message = capability
            .build_application_message(&job, &JobListing::default())
            .unwrap();
        assert!(message.contains("\"Discord bot\""));
        assert!(message.contains("job 0"));
    }

    #[test]
    fn test_template_tag_filter() {
        let mut table = toml::Table::new();
        table.insert(
            "tags".into(),
            toml::Value::Array(vec![toml::Value::String("Discord".into())]),
        );
        let capability = TemplateCapability::from_table(Some(&table)).unwrap();
        assert!(capability.matches(&job(&["discord"]), &JobListing::default()));
        assert!(!capability.matches(&job(&["python"]), &JobListing::default()));
    }

    #[test]
    fn test_unknown_template_key_is_rejected() {
        let mut table = toml::Table::new();
        table.insert("bodyy".into(), toml::Value::String("x".into()));
        assert!(TemplateCapability::from_table(Some(&table)).is_err());
    }

    #[test]
    fn test_first_match_wins() {
        let mut registry = CapabilityRegistry::new();
        registry
            .register(Arc::new(ScriptedCapability::new("python", "").only_tag("python")))
            .unwrap();
        registry.register(Arc::new(TemplateCapability::new())).unwrap();

        let listing = JobListing::default();
        assert_eq!(registry.select(&job(&["python"]), &listing).unwrap().name(), "python");
        assert_eq!(registry.select(&job(&["bot"]), &listing).unwrap().name(), "template");
    }

    #[test]
    fn test_registry_from_config() {
        let mut config = CourierConfig::default();
        assert_eq!(CapabilityRegistry::from_config(&config).unwrap().names(), vec!["template"]);

        config.lifecycle.capabilities.push("translator".into());
        assert!(CapabilityRegistry::from_config(&config).is_err());

        config.lifecycle.capabilities = vec!["template".into(), "template".into()];
        assert!(CapabilityRegistry::from_config(&config).is_err());
    }
}
