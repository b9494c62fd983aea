/*!
 * pahedl - anime episode link resolution and bulk download service.
 *
 * The crate turns an anime title into direct media URLs: search the
 * origin catalog, resolve an episode's download chain through the
 * four-stage pipeline, fan whole ranges out under bounded concurrency,
 * and assemble the results into a streamable ZIP archive. Session
 * cookies, catalog page counts, resolved links and download sessions
 * are all cached locally so repeat work is cheap.
 *
 * `app_controller::Controller` is the facade; everything else is a
 * collaborator behind it.
 */

pub mod app_config;
pub mod app_controller;
pub mod bulk;
pub mod catalog;
pub mod credentials;
pub mod database;
pub mod errors;
pub mod link_cache;
pub mod origin;
pub mod resolve;

pub use app_config::Config;
pub use app_controller::Controller;
pub use errors::{ServiceError, ServiceResult};
