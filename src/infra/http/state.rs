use std::sync::Arc;

use axum::extract::FromRef;

use crate::application::auth::AdminAuthService;
use crate::application::contact::{ContactNotices, ContactService};
use crate::application::content::{BlogService, ContentService, PersonalInfoService};
use crate::application::mail::Mailer;
use crate::application::repos::{DocumentStore, HealthCheck};
use crate::cache::ServerCache;
use crate::domain::documents::{
    AdditionalCompetency, BlogPost, ContactMessage, PersonalInfo, Project, Skill,
};

use super::auth::SessionCookie;
use super::rate_limit::RequestGate;

/// Everything the services need besides the document store.
pub struct Collaborators {
    pub cache: Arc<ServerCache>,
    pub mailer: Arc<dyn Mailer>,
    pub auth: Arc<AdminAuthService>,
    pub request_gate: RequestGate,
    pub contact_notices: ContactNotices,
    pub session_cookie: SessionCookie,
}

#[derive(Clone)]
pub struct AppState {
    pub personal_info: PersonalInfoService,
    pub projects: ContentService<Project>,
    pub skills: ContentService<Skill>,
    pub competencies: ContentService<AdditionalCompetency>,
    pub blog: BlogService,
    pub contact: ContactService,
    pub auth: Arc<AdminAuthService>,
    pub session_cookie: SessionCookie,
    pub request_gate: RequestGate,
    pub health: Arc<dyn HealthCheck>,
}

impl AppState {
    /// Wire every collection service to one store backend.
    pub fn new<S>(store: Arc<S>, deps: Collaborators) -> Self
    where
        S: DocumentStore<PersonalInfo>
            + DocumentStore<Project>
            + DocumentStore<Skill>
            + DocumentStore<AdditionalCompetency>
            + DocumentStore<BlogPost>
            + DocumentStore<ContactMessage>
            + HealthCheck
            + 'static,
    {
        let cache = deps.cache;
        let personal_info: Arc<dyn DocumentStore<PersonalInfo>> = store.clone();
        let projects: Arc<dyn DocumentStore<Project>> = store.clone();
        let skills: Arc<dyn DocumentStore<Skill>> = store.clone();
        let competencies: Arc<dyn DocumentStore<AdditionalCompetency>> = store.clone();
        let posts: Arc<dyn DocumentStore<BlogPost>> = store.clone();
        let messages: Arc<dyn DocumentStore<ContactMessage>> = store.clone();
        let health: Arc<dyn HealthCheck> = store;

        Self {
            personal_info: PersonalInfoService::new(ContentService::new(
                personal_info,
                cache.clone(),
            )),
            projects: ContentService::new(projects, cache.clone()),
            skills: ContentService::new(skills, cache.clone()),
            competencies: ContentService::new(competencies, cache.clone()),
            blog: BlogService::new(ContentService::new(posts, cache.clone())),
            contact: ContactService::new(
                ContentService::new(messages, cache),
                deps.mailer,
                deps.contact_notices,
            ),
            auth: deps.auth,
            session_cookie: deps.session_cookie,
            request_gate: deps.request_gate,
            health,
        }
    }
}

impl FromRef<AppState> for PersonalInfoService {
    fn from_ref(state: &AppState) -> Self {
        state.personal_info.clone()
    }
}

impl FromRef<AppState> for ContentService<Project> {
    fn from_ref(state: &AppState) -> Self {
        state.projects.clone()
    }
}

impl FromRef<AppState> for ContentService<Skill> {
    fn from_ref(state: &AppState) -> Self {
        state.skills.clone()
    }
}

impl FromRef<AppState> for ContentService<AdditionalCompetency> {
    fn from_ref(state: &AppState) -> Self {
        state.competencies.clone()
    }
}

impl FromRef<AppState> for BlogService {
    fn from_ref(state: &AppState) -> Self {
        state.blog.clone()
    }
}

impl FromRef<AppState> for ContactService {
    fn from_ref(state: &AppState) -> Self {
        state.contact.clone()
    }
}

impl FromRef<AppState> for Arc<AdminAuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<AppState> for RequestGate {
    fn from_ref(state: &AppState) -> Self {
        state.request_gate.clone()
    }
}
