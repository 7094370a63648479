use rocket::Route;

mod notifications;
mod suggestions;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(suggestions::routes());
    routes.extend(notifications::routes());
    routes
}
