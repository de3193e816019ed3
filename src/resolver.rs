//! Template resolver – picks the template a certificate renders with and owns
//! template administration, including the single-default rule.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{CertError, Result};
use crate::identity::{Identity, Role};
use crate::store::TemplateStore;
use crate::template::{NewTemplate, Template, TemplatePatch};

pub struct TemplateResolver {
    templates: Arc<dyn TemplateStore>,
}

impl TemplateResolver {
    pub fn new(templates: Arc<dyn TemplateStore>) -> Self {
        Self { templates }
    }

    /// The explicitly requested template, else the single default.
    pub fn resolve(&self, template_id: Option<Uuid>) -> Result<Template> {
        let template = match template_id {
            Some(id) => self
                .templates
                .get_template(id)?
                .ok_or_else(|| CertError::NotFound("Template".to_string()))?,
            None => self
                .templates
                .find_default_template()?
                .ok_or(CertError::NoDefaultTemplate)?,
        };
        template.layout.validate()?;
        log::debug!(
            "Resolved template '{}' ({}) for {}",
            template.name,
            template.id,
            if template_id.is_some() { "explicit id" } else { "default" }
        );
        Ok(template)
    }

    pub fn create(&self, new: NewTemplate, actor: &Identity) -> Result<Template> {
        actor.require_role(&[Role::Admin])?;
        let template = self.templates.insert_template(new.into_template(actor.id)?)?;
        log::info!(
            "Template '{}' created by {}{}",
            template.name,
            actor.id,
            if template.is_default { " (default)" } else { "" }
        );
        Ok(template)
    }

    pub fn list(&self) -> Result<Vec<Template>> {
        self.templates.list_templates()
    }

    pub fn get(&self, id: Uuid) -> Result<Template> {
        self.templates
            .get_template(id)?
            .ok_or_else(|| CertError::NotFound("Template".to_string()))
    }

    pub fn update(&self, id: Uuid, patch: TemplatePatch, actor: &Identity) -> Result<Template> {
        actor.require_role(&[Role::Admin])?;
        let template = self
            .templates
            .update_template(id, &mut |t| patch.apply(t))?;
        log::info!("Template '{}' updated by {}", template.name, actor.id);
        Ok(template)
    }

    /// Make `id` the single default template.
    pub fn set_default(&self, id: Uuid, actor: &Identity) -> Result<Template> {
        self.update(id, TemplatePatch::set_default(), actor)
    }

    /// Delete a template. Refused with `Conflict` while certificates still
    /// reference it.
    pub fn delete(&self, id: Uuid, actor: &Identity) -> Result<()> {
        actor.require_role(&[Role::Admin])?;
        let template = self.get(id)?;
        if !self.templates.remove_template(id)? {
            return Err(CertError::NotFound("Template".to_string()));
        }
        log::info!("Template '{}' deleted by {}", template.name, actor.id);
        Ok(())
    }
}
