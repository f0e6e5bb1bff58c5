use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationService {
    pub id: String,
    pub name: String,
    pub description: String,
    pub connected: bool,
}

impl IntegrationService {
    fn new(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            connected: false,
        }
    }
}

/// Catalog of external services the backend may ask to use. Everything starts
/// disconnected; the user connects services from the console.
#[derive(Debug, Clone)]
pub struct IntegrationRegistry {
    services: Vec<IntegrationService>,
}

impl Default for IntegrationRegistry {
    fn default() -> Self {
        Self {
            services: vec![
                IntegrationService::new(
                    "github",
                    "GitHub",
                    "Repo management, issue tracking, and PR automation.",
                ),
                IntegrationService::new(
                    "facebook",
                    "Facebook",
                    "Social profile management and automated posting.",
                ),
                IntegrationService::new(
                    "firebase",
                    "Firebase",
                    "Auth, Firestore, Functions & RTDB integration.",
                ),
                IntegrationService::new("slack", "Slack", "Channel messaging and workspace bots."),
                IntegrationService::new("n8n", "N8N Automation", "Workflow automation triggers."),
                IntegrationService::new(
                    "remote",
                    "Remote Desktop",
                    "Secure remote control protocol.",
                ),
            ],
        }
    }
}

impl IntegrationRegistry {
    pub fn services(&self) -> &[IntegrationService] {
        &self.services
    }

    /// Unknown services count as disconnected.
    pub fn is_connected(&self, service_id: &str) -> bool {
        self.find(service_id).is_some_and(|s| s.connected)
    }

    /// Flip a service's connection. Returns the new state, or None if unknown.
    pub fn toggle(&mut self, service_id: &str) -> Option<bool> {
        let key = service_id.trim().to_lowercase();
        let service = self.services.iter_mut().find(|s| s.id == key)?;
        service.connected = !service.connected;
        info!(
            "Integration {} is now {}",
            service.id,
            if service.connected {
                "connected"
            } else {
                "disconnected"
            }
        );
        Some(service.connected)
    }

    fn find(&self, service_id: &str) -> Option<&IntegrationService> {
        let key = service_id.trim().to_lowercase();
        self.services.iter().find(|s| s.id == key)
    }
}
