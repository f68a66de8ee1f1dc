pub mod audit;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod stories;
pub mod story_types;

pub use routes::create_router;
