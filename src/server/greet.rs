use axum::{routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Deserialize, Debug)]
pub struct GreetRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    entity_type: EntityType,
}

#[derive(Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    #[default]
    Unknown,
    Human,
    ExtraTerrestrial,
}

#[derive(Serialize, Debug)]
struct GreetResponse {
    message: String,
}

pub fn create_router() -> Router {
    Router::new().route("/greet", post(greet))
}

async fn greet(Json(req): Json<GreetRequest>) -> Json<GreetResponse> {
    info!(route = "/greet", method = "POST", "handle request");
    Json(GreetResponse {
        message: assemble_greeting(&req.name, req.entity_type),
    })
}

fn assemble_greeting(name: &str, entity: EntityType) -> String {
    // nothing to go on at all gets the mysterious greeting
    if name.is_empty() && entity == EntityType::Unknown {
        return "Greetings, mysterious being...".to_string();
    }

    let mut greeting = String::from("Greetings, ");
    if !name.trim().is_empty() {
        greeting.push_str(name);
        greeting.push_str(", ");
    }
    greeting.push_str(match entity {
        EntityType::Human => "earthling",
        EntityType::ExtraTerrestrial => "spaceling",
        EntityType::Unknown => "being of unknown origin",
    });
    greeting
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_request_gets_mysterious_greeting() {
        assert_eq!(
            assemble_greeting("", EntityType::Unknown),
            "Greetings, mysterious being..."
        );
    }

    #[test]
    fn test_named_human() {
        assert_eq!(
            assemble_greeting("Ada", EntityType::Human),
            "Greetings, Ada, earthling"
        );
    }

    #[test]
    fn test_named_extra_terrestrial() {
        assert_eq!(
            assemble_greeting("Zorb", EntityType::ExtraTerrestrial),
            "Greetings, Zorb, spaceling"
        );
    }

    #[test]
    fn test_entity_without_name() {
        assert_eq!(
            assemble_greeting("", EntityType::Human),
            "Greetings, earthling"
        );
    }

    #[test]
    fn test_blank_name_is_skipped() {
        assert_eq!(
            assemble_greeting("   ", EntityType::Unknown),
            "Greetings, being of unknown origin"
        );
    }
}
