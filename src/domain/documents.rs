//! Document contracts for the portfolio collections.
//!
//! Each document type names the collection it lives in, normalises and
//! validates itself before it is written, and defines the order in which lists
//! of it are presented.

use std::cmp::Ordering;

use serde::{Serialize, de::DeserializeOwned};
use time::OffsetDateTime;

pub use portfolio_api_types::{
    AdditionalCompetency, BlogPost, ContactMessage, PersonalInfo, Project, Record, Skill,
    SocialLinks,
};

use super::error::DomainError;
use super::slug::derive_slug;

const MAX_TITLE_CHARS: usize = 200;
const MAX_NAME_CHARS: usize = 100;
const MAX_MESSAGE_CHARS: usize = 5000;
const MAX_EMAIL_CHARS: usize = 254;

pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Storage collection name; also the cache tag for the collection.
    const COLLECTION: &'static str;
    /// Human label used in errors.
    const ENTITY: &'static str;

    /// Trim and check fields in place before a write.
    fn validate(&mut self) -> Result<(), DomainError>;

    /// Presentation order for lists. Newest first unless overridden.
    fn compare(a: &Record<Self>, b: &Record<Self>) -> Ordering {
        b.created_at.cmp(&a.created_at)
    }
}

pub fn sort_records<T: Document>(records: &mut [Record<T>]) {
    records.sort_by(T::compare);
}

impl Document for PersonalInfo {
    const COLLECTION: &'static str = "personal_info";
    const ENTITY: &'static str = "personal info";

    fn validate(&mut self) -> Result<(), DomainError> {
        required("name", &mut self.name, MAX_NAME_CHARS)?;
        required("title", &mut self.title, MAX_TITLE_CHARS)?;
        required("bio", &mut self.bio, MAX_MESSAGE_CHARS)?;
        email("email", &mut self.email)?;
        optional(&mut self.phone);
        optional(&mut self.location);
        optional(&mut self.avatar_url);
        optional(&mut self.resume_url);
        optional(&mut self.social.github);
        optional(&mut self.social.linkedin);
        optional(&mut self.social.twitter);
        optional(&mut self.social.website);
        Ok(())
    }
}

impl Document for Project {
    const COLLECTION: &'static str = "projects";
    const ENTITY: &'static str = "project";

    fn validate(&mut self) -> Result<(), DomainError> {
        required("title", &mut self.title, MAX_TITLE_CHARS)?;
        required("description", &mut self.description, MAX_MESSAGE_CHARS)?;
        optional(&mut self.long_description);
        optional(&mut self.image_url);
        optional(&mut self.github_url);
        optional(&mut self.live_url);
        self.technologies = self
            .technologies
            .iter()
            .map(|tech| tech.trim().to_string())
            .filter(|tech| !tech.is_empty())
            .collect();
        Ok(())
    }

    fn compare(a: &Record<Self>, b: &Record<Self>) -> Ordering {
        b.data
            .featured
            .cmp(&a.data.featured)
            .then(a.data.order.cmp(&b.data.order))
            .then(b.created_at.cmp(&a.created_at))
    }
}

impl Document for Skill {
    const COLLECTION: &'static str = "skills";
    const ENTITY: &'static str = "skill";

    fn validate(&mut self) -> Result<(), DomainError> {
        required("name", &mut self.name, MAX_NAME_CHARS)?;
        required("category", &mut self.category, MAX_NAME_CHARS)?;
        optional(&mut self.icon);
        if self.proficiency > 100 {
            return Err(DomainError::validation(
                "proficiency",
                "must be between 0 and 100",
            ));
        }
        Ok(())
    }

    fn compare(a: &Record<Self>, b: &Record<Self>) -> Ordering {
        a.data
            .category
            .cmp(&b.data.category)
            .then(a.data.order.cmp(&b.data.order))
            .then(b.data.proficiency.cmp(&a.data.proficiency))
    }
}

impl Document for AdditionalCompetency {
    const COLLECTION: &'static str = "additional_competencies";
    const ENTITY: &'static str = "competency";

    fn validate(&mut self) -> Result<(), DomainError> {
        required("title", &mut self.title, MAX_TITLE_CHARS)?;
        required("description", &mut self.description, MAX_MESSAGE_CHARS)?;
        optional(&mut self.icon);
        Ok(())
    }

    fn compare(a: &Record<Self>, b: &Record<Self>) -> Ordering {
        a.data
            .order
            .cmp(&b.data.order)
            .then(b.created_at.cmp(&a.created_at))
    }
}

impl Document for BlogPost {
    const COLLECTION: &'static str = "blog_posts";
    const ENTITY: &'static str = "blog post";

    /// Leaves an empty slug empty; the blog service assigns a unique one.
    fn validate(&mut self) -> Result<(), DomainError> {
        required("title", &mut self.title, MAX_TITLE_CHARS)?;
        required("content", &mut self.content, usize::MAX)?;
        self.excerpt = self.excerpt.trim().to_string();
        optional(&mut self.cover_image);

        let slug = self.slug.trim();
        if !slug.is_empty() {
            self.slug =
                derive_slug(slug).map_err(|err| DomainError::validation("slug", err.to_string()))?;
        }

        self.tags = self
            .tags
            .iter()
            .map(|tag| tag.trim().to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect();
        self.tags.dedup();

        if self.published && self.published_at.is_none() {
            self.published_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    fn compare(a: &Record<Self>, b: &Record<Self>) -> Ordering {
        let a_time = a.data.published_at.unwrap_or(a.created_at);
        let b_time = b.data.published_at.unwrap_or(b.created_at);
        b_time.cmp(&a_time)
    }
}

impl Document for ContactMessage {
    const COLLECTION: &'static str = "contact_messages";
    const ENTITY: &'static str = "contact message";

    fn validate(&mut self) -> Result<(), DomainError> {
        required("name", &mut self.name, MAX_NAME_CHARS)?;
        email("email", &mut self.email)?;
        required("subject", &mut self.subject, MAX_TITLE_CHARS)?;
        required("message", &mut self.message, MAX_MESSAGE_CHARS)?;
        Ok(())
    }
}

fn required(field: &'static str, value: &mut String, max_chars: usize) -> Result<(), DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(field, "is required"));
    }
    if trimmed.chars().count() > max_chars {
        return Err(DomainError::validation(
            field,
            format!("must be at most {max_chars} characters"),
        ));
    }
    *value = trimmed.to_string();
    Ok(())
}

fn optional(value: &mut Option<String>) {
    *value = value
        .take()
        .map(|inner| inner.trim().to_string())
        .filter(|inner| !inner.is_empty());
}

fn email(field: &'static str, value: &mut String) -> Result<(), DomainError> {
    required(field, value, MAX_EMAIL_CHARS)?;
    if !is_plausible_email(value) {
        return Err(DomainError::validation(field, "is not a valid email address"));
    }
    Ok(())
}

fn is_plausible_email(value: &str) -> bool {
    let mut parts = value.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && !value.chars().any(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
