//! The configuration document: root aggregate rendered into one config file

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::drivers::IoContext;
use super::logpath::LogPath;
use super::option::{set_option, OptionValue, Options};
use super::render;
use super::statement::{Statement, StatementGroup, StatementId, StatementKind};
use crate::config::HarnessConfig;
use crate::error::{LightError, Result};
use crate::registry::ResourceRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateForm {
    /// `template NAME { template("..."); };`
    Block,
    /// `template NAME "...";`
    Simple,
    /// `template-function NAME "...";`
    Function,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub name: String,
    pub body: String,
    pub escape: Option<bool>,
    pub form: TemplateForm,
}

impl Template {
    pub fn block(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
            escape: None,
            form: TemplateForm::Block,
        }
    }

    pub fn simple(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            form: TemplateForm::Simple,
            ..Self::block(name, body)
        }
    }

    pub fn function(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            form: TemplateForm::Function,
            ..Self::block(name, body)
        }
    }

    /// `template-escape()`; block form only
    pub fn with_escape(mut self, escape: bool) -> Self {
        self.escape = Some(escape);
        self
    }
}

/// Configuration built by a test, then rendered for one daemon run
///
/// Statement names come from the shared [`ResourceRegistry`], so any number of
/// same-kind statements can coexist, also across documents of parallel tests.
#[derive(Debug)]
pub struct ConfigDocument {
    registry: Arc<ResourceRegistry>,
    io: IoContext,
    version: String,
    includes: Vec<String>,
    global_options: Options,
    preamble: Option<String>,
    templates: Vec<Template>,
    groups: Vec<StatementGroup>,
    logpaths: Vec<LogPath>,
    raw_config: Option<String>,
}

impl ConfigDocument {
    pub fn new(registry: Arc<ResourceRegistry>, config: &HarnessConfig) -> Self {
        Self {
            registry,
            io: IoContext::from(config),
            version: config.config_version.clone(),
            includes: Vec::new(),
            global_options: Vec::new(),
            preamble: None,
            templates: Vec::new(),
            groups: Vec::new(),
            logpaths: Vec::new(),
            raw_config: None,
        }
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub(crate) fn io_context(&self) -> &IoContext {
        &self.io
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    pub fn add_include(&mut self, include: impl Into<String>) {
        self.includes.push(include.into());
    }

    /// Set one entry of the `options {}` block, replacing an earlier value
    pub fn update_global_option(&mut self, name: impl Into<String>, value: impl Into<OptionValue>) {
        set_option(&mut self.global_options, name, value);
    }

    /// Text emitted verbatim after the `options {}` block
    pub fn set_preamble(&mut self, preamble: impl Into<String>) {
        self.preamble = Some(preamble.into());
    }

    pub fn add_template(&mut self, template: Template) {
        self.templates.push(template);
    }

    /// Render exactly `raw` instead of the document
    pub fn set_raw_config(&mut self, raw: impl Into<String>) {
        self.raw_config = Some(raw.into());
    }

    /// Reserve a uniquely named, still empty statement block
    pub fn create_statement(&mut self, kind: StatementKind, hint: &str) -> Result<StatementId> {
        let hint: String = hint
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let prefix = if hint.is_empty() {
            kind.id_prefix().to_string()
        } else {
            format!("{}_{hint}", kind.id_prefix())
        };
        let name = self.registry.unique_name(&prefix)?;
        let id = StatementId::new(kind, name);
        debug!(statement = %id, kind = %kind, "statement created");
        self.groups.push(StatementGroup {
            id: id.clone(),
            statement: None,
        });
        Ok(id)
    }

    /// Create a block and connect `statement` in one step
    pub fn add_statement(&mut self, kind: StatementKind, statement: Statement) -> Result<StatementId> {
        let id = self.create_statement(kind, statement.driver_name())?;
        self.connect_driver_with_statement(&id, statement)?;
        Ok(id)
    }

    fn group_mut(&mut self, id: &StatementId) -> Result<&mut StatementGroup> {
        self.groups
            .iter_mut()
            .find(|g| g.id == *id)
            .ok_or_else(|| LightError::StatementNotFound {
                statement: id.to_string(),
            })
    }

    /// Attach the driver of a statement block
    ///
    /// Re-connecting an identical driver is a no-op. A block already holding
    /// a different driver is rejected.
    pub fn connect_driver_with_statement(&mut self, id: &StatementId, statement: Statement) -> Result<()> {
        let group = self.group_mut(id)?;
        if let Some(existing) = &group.statement {
            if *existing == statement {
                return Ok(());
            }
            return Err(LightError::DriverAlreadyAssigned {
                statement: id.to_string(),
                existing: existing.driver_name().to_string(),
                requested: statement.driver_name().to_string(),
            });
        }
        group.statement = Some(statement);
        Ok(())
    }

    /// Set an option on the driver of an existing block
    pub fn add_option(
        &mut self,
        id: &StatementId,
        name: impl Into<String>,
        value: impl Into<OptionValue>,
    ) -> Result<()> {
        let group = self.group_mut(id)?;
        match group.statement.as_mut() {
            Some(statement) => {
                statement.set_option(name, value);
                Ok(())
            }
            None => Err(LightError::EmptyStatement {
                statement: id.to_string(),
            }),
        }
    }

    pub fn statement(&self, id: &StatementId) -> Option<&Statement> {
        self.groups
            .iter()
            .find(|g| g.id == *id)
            .and_then(|g| g.statement.as_ref())
    }

    /// Validate and append a top-level log path
    pub fn connect_statements_in_logpath(&mut self, path: LogPath) -> Result<()> {
        path.validate()?;
        for id in path.referenced() {
            if !self.groups.iter().any(|g| g.id == *id) {
                return Err(LightError::StatementNotFound {
                    statement: id.to_string(),
                });
            }
        }
        self.logpaths.push(path);
        Ok(())
    }

    /// Shorthand for an unnamed path over `ids`
    pub fn create_logpath<I>(&mut self, ids: impl IntoIterator<Item = I>) -> Result<()>
    where
        I: AsRef<StatementId>,
    {
        self.connect_statements_in_logpath(LogPath::new().with_all(ids))
    }

    pub fn logpaths(&self) -> &[LogPath] {
        &self.logpaths
    }

    /// Configuration text
    ///
    /// Fails if a statement block never got a driver.
    pub fn render(&self) -> Result<String> {
        if let Some(raw) = &self.raw_config {
            return Ok(raw.clone());
        }

        let mut out = String::new();
        render::render_version(&mut out, &self.version);
        render::render_includes(&mut out, &self.includes);
        render::render_global_options(&mut out, &self.global_options);
        if let Some(preamble) = &self.preamble {
            out.push_str(preamble);
            if !preamble.ends_with('\n') {
                out.push('\n');
            }
        }
        render::render_templates(&mut out, &self.templates);

        for kind in StatementKind::ALL {
            for group in self.groups.iter().filter(|g| g.id.kind() == kind) {
                let statement = group.statement.as_ref().ok_or_else(|| LightError::EmptyStatement {
                    statement: group.id.to_string(),
                })?;
                render::render_statement_group(&mut out, group, statement);
            }
        }

        for path in &self.logpaths {
            out.push('\n');
            render::render_logpath(&mut out, path, 0);
        }
        Ok(out)
    }

    /// Render and write to `path`; returns the rendered text
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let rendered = self.render()?;
        std::fs::write(path, &rendered)?;
        info!(path = %path.display(), "generated syslog-ng config\n{rendered}");
        Ok(rendered)
    }
}
