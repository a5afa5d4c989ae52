mod http_gateway;

pub use http_gateway::HttpNotificationGateway;
