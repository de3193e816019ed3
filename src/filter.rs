//! Typed certificate query filters and pagination.
//!
//! Query strings such as `status=Issued&issueDate[gte]=2024-01-01T00:00:00Z`
//! are parsed into a [`CertificateFilter`] built from an enumerated set of
//! fields and operators. The pagination keys (`page`, `limit`) and the
//! presentation keys (`select`, `sort`) are stripped before filtering.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::certificate::{Certificate, CertificateStatus};
use crate::error::{CertError, Result};

const RESERVED_KEYS: [&str; 4] = ["select", "sort", "page", "limit"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

impl FilterOp {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "eq" => Ok(FilterOp::Eq),
            "gt" => Ok(FilterOp::Gt),
            "gte" => Ok(FilterOp::Gte),
            "lt" => Ok(FilterOp::Lt),
            "lte" => Ok(FilterOp::Lte),
            "in" => Ok(FilterOp::In),
            other => Err(CertError::Validation(format!(
                "unsupported filter operator '{other}'"
            ))),
        }
    }

    fn is_ordering(&self) -> bool {
        matches!(self, FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Status,
    RecipientName,
    RecipientEmail,
    CourseTitle,
    CertificateId,
    IssueDate,
    CreatedAt,
    TemplateId,
    Issuer,
}

impl FilterField {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "status" => Ok(FilterField::Status),
            "recipientName" => Ok(FilterField::RecipientName),
            "recipientEmail" => Ok(FilterField::RecipientEmail),
            "courseTitle" => Ok(FilterField::CourseTitle),
            "certificateId" => Ok(FilterField::CertificateId),
            "issueDate" => Ok(FilterField::IssueDate),
            "createdAt" => Ok(FilterField::CreatedAt),
            "templateId" => Ok(FilterField::TemplateId),
            "issuer" => Ok(FilterField::Issuer),
            other => Err(CertError::Validation(format!(
                "unknown filter field '{other}'"
            ))),
        }
    }

    /// Fields whose values have no meaningful order.
    fn is_unordered(&self) -> bool {
        matches!(
            self,
            FilterField::Status | FilterField::TemplateId | FilterField::Issuer
        )
    }

    fn value_of(&self, cert: &Certificate) -> Option<FilterValue> {
        Some(match self {
            FilterField::Status => FilterValue::Status(cert.status),
            FilterField::RecipientName => FilterValue::Text(cert.recipient_name.clone()),
            FilterField::RecipientEmail => FilterValue::Text(cert.recipient_email.clone()),
            FilterField::CourseTitle => FilterValue::Text(cert.course_title.clone()),
            FilterField::CertificateId => FilterValue::Text(cert.certificate_id.clone()),
            FilterField::IssueDate => FilterValue::Date(cert.issue_date),
            FilterField::CreatedAt => FilterValue::Date(cert.created_at),
            FilterField::TemplateId => FilterValue::Id(cert.template_id?),
            FilterField::Issuer => FilterValue::Id(cert.issuer),
        })
    }

    fn parse_value(&self, raw: &str) -> Result<FilterValue> {
        let raw = raw.trim();
        match self {
            FilterField::Status => CertificateStatus::parse(raw).map(FilterValue::Status),
            FilterField::IssueDate | FilterField::CreatedAt => parse_date(raw).map(FilterValue::Date),
            FilterField::TemplateId | FilterField::Issuer => Uuid::parse_str(raw)
                .map(FilterValue::Id)
                .map_err(|e| CertError::Validation(format!("invalid id '{raw}': {e}"))),
            _ => Ok(FilterValue::Text(raw.to_string())),
        }
    }
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| CertError::Validation(format!("invalid date '{raw}'")))
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Date(DateTime<Utc>),
    Id(Uuid),
    Status(CertificateStatus),
    List(Vec<FilterValue>),
}

impl FilterValue {
    fn compare(&self, other: &FilterValue) -> Option<Ordering> {
        match (self, other) {
            (FilterValue::Text(a), FilterValue::Text(b)) => Some(a.cmp(b)),
            (FilterValue::Date(a), FilterValue::Date(b)) => Some(a.cmp(b)),
            (FilterValue::Id(a), FilterValue::Id(b)) => Some(a.cmp(b)),
            (FilterValue::Status(a), FilterValue::Status(b)) => {
                if a == b {
                    Some(Ordering::Equal)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: FilterField,
    pub op: FilterOp,
    pub value: FilterValue,
}

impl Condition {
    fn matches(&self, cert: &Certificate) -> bool {
        let Some(actual) = self.field.value_of(cert) else {
            return false;
        };
        match (&self.op, &self.value) {
            (FilterOp::In, FilterValue::List(items)) => items
                .iter()
                .any(|v| actual.compare(v) == Some(Ordering::Equal)),
            (FilterOp::In, single) => actual.compare(single) == Some(Ordering::Equal),
            (op, expected) => match actual.compare(expected) {
                Some(ord) => match op {
                    FilterOp::Eq => ord == Ordering::Equal,
                    FilterOp::Gt => ord == Ordering::Greater,
                    FilterOp::Gte => ord != Ordering::Less,
                    FilterOp::Lt => ord == Ordering::Less,
                    FilterOp::Lte => ord != Ordering::Greater,
                    FilterOp::In => false,
                },
                None => false,
            },
        }
    }
}

/// Conjunction of conditions over certificate fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CertificateFilter {
    conditions: Vec<Condition>,
}

impl CertificateFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition, rejecting ordering operators on unordered fields.
    pub fn with(mut self, field: FilterField, op: FilterOp, value: FilterValue) -> Result<Self> {
        if op.is_ordering() && field.is_unordered() {
            return Err(CertError::Validation(format!(
                "operator {op:?} is not supported on {field:?}"
            )));
        }
        self.conditions.push(Condition { field, op, value });
        Ok(self)
    }

    /// Restrict results to certificates created by `issuer`.
    pub fn scoped_to_issuer(mut self, issuer: Uuid) -> Self {
        self.conditions
            .retain(|c| c.field != FilterField::Issuer);
        self.conditions.push(Condition {
            field: FilterField::Issuer,
            op: FilterOp::Eq,
            value: FilterValue::Id(issuer),
        });
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn matches(&self, cert: &Certificate) -> bool {
        self.conditions.iter().all(|c| c.matches(cert))
    }

    /// Parse decoded query pairs (`key`, `value`) into a filter and a page
    /// request. Keys take the form `field` or `field[op]`.
    pub fn from_query<K, V>(pairs: &[(K, V)]) -> Result<(Self, PageRequest)>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut filter = Self::new();
        let mut page = PageRequest::default();

        for (key, value) in pairs {
            let (key, value) = (key.as_ref().trim(), value.as_ref());
            match key {
                "page" => {
                    page = PageRequest::new(parse_positive(value, PageRequest::DEFAULT_PAGE), page.limit())
                }
                "limit" => {
                    page = PageRequest::new(page.page(), parse_positive(value, PageRequest::DEFAULT_LIMIT))
                }
                k if RESERVED_KEYS.contains(&k) => {}
                k => {
                    let (field, op) = split_key(k)?;
                    let value = if op == FilterOp::In {
                        FilterValue::List(
                            value
                                .split(',')
                                .filter(|s| !s.trim().is_empty())
                                .map(|s| field.parse_value(s))
                                .collect::<Result<_>>()?,
                        )
                    } else {
                        field.parse_value(value)?
                    };
                    filter = filter.with(field, op, value)?;
                }
            }
        }
        Ok((filter, page))
    }
}

fn split_key(key: &str) -> Result<(FilterField, FilterOp)> {
    match key.split_once('[') {
        Some((field, rest)) => {
            let op = rest
                .strip_suffix(']')
                .ok_or_else(|| CertError::Validation(format!("malformed filter key '{key}'")))?;
            Ok((FilterField::parse(field)?, FilterOp::parse(op)?))
        }
        None => Ok((FilterField::parse(key)?, FilterOp::Eq)),
    }
}

fn parse_positive(raw: &str, fallback: usize) -> usize {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => fallback,
    }
}

/// 1-based page request. `page` is at least 1 and `limit` lies in
/// `1..=MAX_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    page: usize,
    limit: usize,
}

impl PageRequest {
    pub const DEFAULT_PAGE: usize = 1;
    pub const DEFAULT_LIMIT: usize = 10;
    pub const MAX_LIMIT: usize = 100;

    pub fn new(page: usize, limit: usize) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Records skipped before this page; saturates for absurd page numbers.
    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn pagination(&self, total: usize) -> Pagination {
        let end = self.page.saturating_mul(self.limit);
        Pagination {
            next: (end < total).then(|| PageRequest::new(self.page + 1, self.limit)),
            prev: (self.page > 1).then(|| PageRequest::new(self.page - 1, self.limit)),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: Self::DEFAULT_PAGE,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub next: Option<PageRequest>,
    pub prev: Option<PageRequest>,
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: usize,
    pub total: usize,
    pub pagination: Pagination,
    pub data: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::NewCertificate;
    use crate::identity::{Identity, Role};

    fn cert(name: &str, date: &str) -> Certificate {
        let mut c = NewCertificate::new(name, "a@example.com", "Rust")
            .into_certificate(&Identity::new("I", Role::Issuer), None)
            .unwrap();
        c.issue_date = parse_date(date).unwrap();
        c
    }

    #[test]
    fn reserved_keys_are_stripped() {
        let (filter, page) = CertificateFilter::from_query(&[
            ("page", "3"),
            ("limit", "5"),
            ("sort", "-createdAt"),
            ("select", "recipientName"),
        ])
        .unwrap();
        assert!(filter.conditions().is_empty());
        assert_eq!(page, PageRequest::new(3, 5));
        assert_eq!(page.offset(), 10);
    }

    #[test]
    fn comparison_operators() {
        let (filter, _) = CertificateFilter::from_query(&[
            ("issueDate[gte]", "2024-01-01"),
            ("issueDate[lt]", "2024-02-01"),
        ])
        .unwrap();
        assert!(filter.matches(&cert("A", "2024-01-15")));
        assert!(filter.matches(&cert("A", "2024-01-01")));
        assert!(!filter.matches(&cert("A", "2024-02-01")));
        assert!(!filter.matches(&cert("A", "2023-12-31")));
    }

    #[test]
    fn in_operator_matches_any() {
        let (filter, _) =
            CertificateFilter::from_query(&[("recipientName[in]", "Ann,Bob")]).unwrap();
        assert!(filter.matches(&cert("Bob", "2024-01-01")));
        assert!(!filter.matches(&cert("Cy", "2024-01-01")));

        let (filter, _) = CertificateFilter::from_query(&[("status[in]", "Issued,Revoked")]).unwrap();
        assert!(filter.matches(&cert("Cy", "2024-01-01")));
    }

    #[test]
    fn rejects_unknown_fields_and_operators() {
        assert!(CertificateFilter::from_query(&[("password", "x")]).is_err());
        assert!(CertificateFilter::from_query(&[("status[regex]", "x")]).is_err());
        assert!(CertificateFilter::from_query(&[("status[gt]", "Issued")]).is_err());
        assert!(CertificateFilter::from_query(&[("issueDate[gte", "2024-01-01")]).is_err());
    }

    #[test]
    fn issuer_scope_replaces_caller_supplied_issuer() {
        let me = Uuid::new_v4();
        let (filter, _) =
            CertificateFilter::from_query(&[("issuer", Uuid::new_v4().to_string())]).unwrap();
        let scoped = filter.scoped_to_issuer(me);
        assert_eq!(scoped.conditions().len(), 1);
        assert_eq!(scoped.conditions()[0].value, FilterValue::Id(me));
    }

    #[test]
    fn pagination_links() {
        let p = PageRequest::new(1, 10).pagination(25);
        assert_eq!(p.next, Some(PageRequest::new(2, 10)));
        assert_eq!(p.prev, None);
        let p = PageRequest::new(3, 10).pagination(25);
        assert_eq!(p.next, None);
        assert_eq!(p.prev, Some(PageRequest::new(2, 10)));
        assert_eq!(PageRequest::default(), PageRequest::new(1, 10));
    }

    #[test]
    fn extreme_page_values_stay_in_range() {
        let huge = usize::MAX.to_string();
        let (_, page) =
            CertificateFilter::from_query(&[("page", huge.as_str()), ("limit", huge.as_str())]).unwrap();
        assert_eq!(page.page(), usize::MAX);
        assert_eq!(page.limit(), PageRequest::MAX_LIMIT);
        assert_eq!(page.offset(), usize::MAX);
        let links = page.pagination(25);
        assert_eq!(links.next, None);
        assert_eq!(links.prev, Some(PageRequest::new(usize::MAX - 1, PageRequest::MAX_LIMIT)));

        assert_eq!(PageRequest::new(0, 0), PageRequest::new(1, 1));
        assert_eq!(PageRequest::new(2, 5000).limit(), 100);
    }

    #[test]
    fn bad_page_values_fall_back() {
        let (_, page) = CertificateFilter::from_query(&[("page", "zero"), ("limit", "0")]).unwrap();
        assert_eq!(page, PageRequest::default());
    }
}
