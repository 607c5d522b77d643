//! The site's route table.

use solar_nexus::{RouteConfig, Router};

use crate::pages::LOCATION_MODULE;

pub fn register(router: &Router) -> solar_nexus::Result<()> {
    router.add_route(
        "/",
        RouteConfig::new("home", "Solar Panels Oldham & Saddleworth", "home")
            .description("Solar panel installation across Oldham, Saddleworth and Uppermill."),
    )?;
    for (path, name, town) in [
        ("/oldham", "oldham", "Oldham"),
        ("/saddleworth", "saddleworth", "Saddleworth"),
        ("/uppermill", "uppermill", "Uppermill"),
    ] {
        router.add_route(
            path,
            RouteConfig::new(name, format!("Solar Panels {town}"), "location")
                .module_path(LOCATION_MODULE)
                .description(format!("Local solar panel installers serving {town}.")),
        )?;
    }
    router.add_route(
        "/calculator",
        RouteConfig::new("calculator", "Solar Savings Calculator", "calculator")
            .description("Estimate what solar panels could save on your energy bills."),
    )?;
    router.add_route(
        "/quote",
        RouteConfig::new("quote", "Get a Free Quote", "quote")
            .description("Book a free, no-obligation solar survey."),
    )?;
    router.add_route("*", RouteConfig::new("not-found", "Page Not Found", "not-found"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use solar_nexus::{App, AppConfig, Document, Host, MemoryStorage, ReqwestTransport};
    use std::sync::Arc;

    #[tokio::test]
    async fn table_is_registered_in_order() {
        let app = App::new(
            AppConfig::default(),
            Host {
                document: Document::new(),
                storage: Arc::new(MemoryStorage::new()),
                modules: Arc::new(crate::pages::modules()),
                transport: Arc::new(ReqwestTransport::default()),
            },
        );
        register(app.router()).unwrap();

        let paths: Vec<String> = app.router().routes().into_iter().map(|(p, _)| p).collect();
        assert_eq!(
            paths,
            ["/", "/oldham", "/saddleworth", "/uppermill", "/calculator", "/quote", "*"]
        );
    }
}
