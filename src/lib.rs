//! Task tracking service: per-user tasks with soft delete, an append-only
//! activity log, and list/board projections, over a pluggable document store.

pub mod app_state;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod saga;
pub mod services;
pub mod store;
pub mod task;
pub mod user_management;
pub mod views;

use actix_web::web;

use crate::auth::{logout, start_session};
use crate::task::{
    board_view, bulk_delete, create_task, delete_task, deleted_tasks, get_task, list_tasks,
    list_view, restore_task, task_history, update_task,
};
use crate::user_management::get_current_user;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/session", web::post().to(start_session))
            .route("/logout", web::post().to(logout)),
    )
    .service(web::scope("/users").route("/me", web::get().to(get_current_user)))
    // Fixed paths before "/{task_id}"
    .service(
        web::scope("/tasks")
            .route("", web::get().to(list_tasks))
            .route("", web::post().to(create_task))
            .route("/list", web::get().to(list_view))
            .route("/board", web::get().to(board_view))
            .route("/deleted", web::get().to(deleted_tasks))
            .route("/bulk_delete", web::post().to(bulk_delete))
            .route("/{task_id}", web::get().to(get_task))
            .route("/{task_id}", web::put().to(update_task))
            .route("/{task_id}", web::delete().to(delete_task))
            .route("/{task_id}/restore", web::post().to(restore_task))
            .route("/{task_id}/history", web::get().to(task_history)),
    );
}
