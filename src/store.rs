//! Persistence seams. The real document store lives outside the crate; these
//! traits are its interface, and [`MemoryStore`] is the in-process
//! implementation used by the CLI and the tests.
//!
//! Every operation that touches more than one record runs as a single
//! critical section of the implementing store. That covers the
//! default-template flag and the rule that a certificate only ever
//! references a template that exists.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use crate::certificate::{Certificate, CertificateStatus};
use crate::error::{CertError, Result};
use crate::filter::{CertificateFilter, PageRequest};
use crate::identity::Identity;
use crate::template::Template;

pub trait CertificateStore: Send + Sync {
    /// Persist a new record. Fails with `Conflict` on a duplicate public id
    /// and `NotFound` if its template does not exist.
    fn insert_certificate(&self, cert: Certificate) -> Result<Certificate>;
    fn get_certificate(&self, id: Uuid) -> Result<Option<Certificate>>;
    fn find_by_public_id(&self, public_id: &str) -> Result<Option<Certificate>>;
    /// Read-modify-write one record atomically. Returns the updated record.
    /// A newly referenced template must exist.
    fn update_certificate(
        &self,
        id: Uuid,
        f: &mut dyn FnMut(&mut Certificate) -> Result<()>,
    ) -> Result<Certificate>;
    fn remove_certificate(&self, id: Uuid) -> Result<bool>;
    /// Matching records, newest first, sliced by `page`, plus the total count.
    fn query_certificates(
        &self,
        filter: &CertificateFilter,
        page: PageRequest,
    ) -> Result<(Vec<Certificate>, usize)>;
    fn count_by_status(&self, status: CertificateStatus) -> Result<usize>;
}

pub trait TemplateStore: Send + Sync {
    /// Persist a new template. Fails with `Conflict` on a duplicate name. When
    /// the template is the default, every other default flag is cleared in the
    /// same critical section.
    fn insert_template(&self, template: Template) -> Result<Template>;
    fn get_template(&self, id: Uuid) -> Result<Option<Template>>;
    fn find_default_template(&self) -> Result<Option<Template>>;
    /// All templates, newest first.
    fn list_templates(&self) -> Result<Vec<Template>>;
    /// Read-modify-write one template. If the result is the default, every
    /// other template's flag is cleared in the same critical section.
    fn update_template(
        &self,
        id: Uuid,
        f: &mut dyn FnMut(&mut Template) -> Result<()>,
    ) -> Result<Template>;
    /// Remove a template. Fails with `Conflict`, removing nothing, while any
    /// certificate references it.
    fn remove_template(&self, id: Uuid) -> Result<bool>;
    fn count_templates(&self) -> Result<usize>;
}

pub trait IdentityStore: Send + Sync {
    fn get_identity(&self, id: Uuid) -> Result<Option<Identity>>;
}

#[derive(Default)]
struct Tables {
    certificates: HashMap<Uuid, Certificate>,
    templates: HashMap<Uuid, Template>,
    identities: HashMap<Uuid, Identity>,
}

/// In-memory store guarded by one lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_identity(&self, identity: Identity) -> Result<()> {
        self.write()?.identities.insert(identity.id, identity);
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| CertError::Store("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| CertError::Store("store lock poisoned".to_string()))
    }
}

fn require_template(tables: &Tables, template_id: Option<Uuid>) -> Result<()> {
    match template_id {
        Some(id) if !tables.templates.contains_key(&id) => {
            Err(CertError::NotFound("Template".to_string()))
        }
        _ => Ok(()),
    }
}

fn clear_other_defaults(templates: &mut HashMap<Uuid, Template>, keep: Uuid) {
    for t in templates.values_mut() {
        if t.id != keep {
            t.is_default = false;
        }
    }
}

impl CertificateStore for MemoryStore {
    fn insert_certificate(&self, cert: Certificate) -> Result<Certificate> {
        let mut tables = self.write()?;
        if tables
            .certificates
            .values()
            .any(|c| c.certificate_id == cert.certificate_id)
        {
            return Err(CertError::Conflict(format!(
                "certificate id {} already exists",
                cert.certificate_id
            )));
        }
        require_template(&tables, cert.template_id)?;
        tables.certificates.insert(cert.id, cert.clone());
        Ok(cert)
    }

    fn get_certificate(&self, id: Uuid) -> Result<Option<Certificate>> {
        Ok(self.read()?.certificates.get(&id).cloned())
    }

    fn find_by_public_id(&self, public_id: &str) -> Result<Option<Certificate>> {
        Ok(self
            .read()?
            .certificates
            .values()
            .find(|c| c.certificate_id == public_id)
            .cloned())
    }

    fn update_certificate(
        &self,
        id: Uuid,
        f: &mut dyn FnMut(&mut Certificate) -> Result<()>,
    ) -> Result<Certificate> {
        let mut tables = self.write()?;
        let current = tables
            .certificates
            .get(&id)
            .ok_or_else(|| CertError::NotFound("Certificate".to_string()))?;
        let mut next = current.clone();
        f(&mut next)?;
        if next.template_id != current.template_id {
            require_template(&tables, next.template_id)?;
        }
        tables.certificates.insert(id, next.clone());
        Ok(next)
    }

    fn remove_certificate(&self, id: Uuid) -> Result<bool> {
        Ok(self.write()?.certificates.remove(&id).is_some())
    }

    fn query_certificates(
        &self,
        filter: &CertificateFilter,
        page: PageRequest,
    ) -> Result<(Vec<Certificate>, usize)> {
        let tables = self.read()?;
        let mut matching: Vec<&Certificate> = tables
            .certificates
            .values()
            .filter(|c| filter.matches(c))
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.certificate_id.cmp(&b.certificate_id))
        });
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(page.offset())
            .take(page.limit())
            .cloned()
            .collect();
        Ok((items, total))
    }

    fn count_by_status(&self, status: CertificateStatus) -> Result<usize> {
        Ok(self
            .read()?
            .certificates
            .values()
            .filter(|c| c.status == status)
            .count())
    }
}

impl TemplateStore for MemoryStore {
    fn insert_template(&self, template: Template) -> Result<Template> {
        let mut tables = self.write()?;
        if tables.templates.values().any(|t| t.name == template.name) {
            return Err(CertError::Conflict(format!(
                "Template with name '{}' already exists",
                template.name
            )));
        }
        if template.is_default {
            clear_other_defaults(&mut tables.templates, template.id);
        }
        tables.templates.insert(template.id, template.clone());
        Ok(template)
    }

    fn get_template(&self, id: Uuid) -> Result<Option<Template>> {
        Ok(self.read()?.templates.get(&id).cloned())
    }

    fn find_default_template(&self) -> Result<Option<Template>> {
        Ok(self
            .read()?
            .templates
            .values()
            .find(|t| t.is_default)
            .cloned())
    }

    fn list_templates(&self) -> Result<Vec<Template>> {
        let mut all: Vec<Template> = self.read()?.templates.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(all)
    }

    fn update_template(
        &self,
        id: Uuid,
        f: &mut dyn FnMut(&mut Template) -> Result<()>,
    ) -> Result<Template> {
        let mut tables = self.write()?;
        let current = tables
            .templates
            .get(&id)
            .ok_or_else(|| CertError::NotFound("Template".to_string()))?;
        let mut next = current.clone();
        f(&mut next)?;
        next.id = id;
        if tables
            .templates
            .values()
            .any(|t| t.id != id && t.name == next.name)
        {
            return Err(CertError::Conflict(format!(
                "Template with name '{}' already exists",
                next.name
            )));
        }
        if next.is_default {
            clear_other_defaults(&mut tables.templates, id);
        }
        tables.templates.insert(id, next.clone());
        Ok(next)
    }

    fn remove_template(&self, id: Uuid) -> Result<bool> {
        let mut tables = self.write()?;
        let Some(template) = tables.templates.get(&id) else {
            return Ok(false);
        };
        let refs = tables
            .certificates
            .values()
            .filter(|c| c.template_id == Some(id))
            .count();
        if refs > 0 {
            return Err(CertError::Conflict(format!(
                "Template '{}' is used by {refs} certificate(s)",
                template.name
            )));
        }
        tables.templates.remove(&id);
        Ok(true)
    }

    fn count_templates(&self) -> Result<usize> {
        Ok(self.read()?.templates.len())
    }
}

impl IdentityStore for MemoryStore {
    fn get_identity(&self, id: Uuid) -> Result<Option<Identity>> {
        Ok(self.read()?.identities.get(&id).cloned())
    }
}
