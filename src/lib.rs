#![doc = "The `taskforge` library crate."]
#![doc = ""]
#![doc = "Owner-scoped task tracking: domain models, the storage seam with its Postgres"]
#![doc = "and in-memory backends, the auth and task services, routing configuration and"]
#![doc = "error handling. The binary (`main.rs`) wires these into an actix-web server."]

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod store;
pub mod tasks;

use std::sync::Arc;

use actix_web::web;

use crate::auth::{AuthService, PasswordHasher, TokenIssuer};
use crate::config::Config;
use crate::store::{CallPolicy, TaskStore, UserStore};
use crate::tasks::TaskService;

// The actix `App` itself is assembled in main.rs and in the integration tests;
// returning it from here runs into HttpServiceFactory trait bounds.

/// Services shared by every worker, built once from the configuration.
#[derive(Clone)]
pub struct AppServices {
    pub auth: web::Data<AuthService>,
    pub tasks: web::Data<TaskService>,
    pub tokens: TokenIssuer,
}

impl AppServices {
    pub fn new<S>(store: Arc<S>, config: &Config) -> Self
    where
        S: UserStore + TaskStore + 'static,
    {
        let tokens = TokenIssuer::from_config(&config.jwt);
        let calls = CallPolicy::from_config(config);
        let users: Arc<dyn UserStore> = store.clone();
        let task_store: Arc<dyn TaskStore> = store;

        Self {
            auth: web::Data::new(AuthService::new(
                users,
                PasswordHasher::new(config.bcrypt_cost),
                tokens.clone(),
                calls,
            )),
            tasks: web::Data::new(TaskService::new(task_store, calls)),
            tokens,
        }
    }
}
