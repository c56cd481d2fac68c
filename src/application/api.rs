//! Transport-agnostic request handlers.
//!
//! Each handler maps a JSON body to a status code and a JSON payload. An HTTP
//! layer only has to route and copy these through; no handler panics.

use serde::Serialize;
use serde_json::{json, Value};

use super::anemia::AnemiaClassifier;
use super::inference::PatientInput;
use super::surgery::SurgeryRiskService;
use crate::domain::CbcPanel;
use crate::RecoveryError;

/// Status code and JSON body of a handled request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok<T: Serialize>(payload: &T) -> Self {
        match serde_json::to_value(payload) {
            Ok(body) => Self { status: 200, body },
            Err(e) => Self::internal(&e.into()),
        }
    }

    fn bad_request(error: &RecoveryError) -> Self {
        Self {
            status: 400,
            body: json!({ "error": error.to_string() }),
        }
    }

    fn internal(error: &RecoveryError) -> Self {
        tracing::error!(error = %error, "Request failed");
        Self {
            status: 500,
            body: json!({ "error": error.to_string() }),
        }
    }
}

/// Handlers over the loaded models.
pub struct ApiHandler {
    anemia: Option<AnemiaClassifier>,
    surgery: SurgeryRiskService,
}

impl ApiHandler {
    #[must_use]
    pub fn new(anemia: Option<AnemiaClassifier>, surgery: SurgeryRiskService) -> Self {
        Self { anemia, surgery }
    }

    /// Anemia severity for a CBC panel. A missing required field is a 400
    /// and never reaches the model.
    #[must_use]
    pub fn handle_anemia_request(&self, body: &Value) -> ApiResponse {
        let panel = match CbcPanel::from_json(body) {
            Ok(panel) => panel,
            Err(e @ RecoveryError::MissingField(_)) => return ApiResponse::bad_request(&e),
            Err(e) => return ApiResponse::internal(&e),
        };
        match &self.anemia {
            Some(classifier) => ApiResponse::ok(&classifier.predict(&panel)),
            None => ApiResponse::internal(&RecoveryError::ModelNotLoaded("anemia classifier".into())),
        }
    }

    /// Surgical risk zone for a (possibly partial or empty) patient.
    #[must_use]
    pub fn handle_surgery_request(&self, body: &Value) -> ApiResponse {
        let input = if body.is_null() {
            Ok(PatientInput::default())
        } else {
            serde_json::from_value::<PatientInput>(body.clone())
                .map_err(|e| RecoveryError::Validation(e.to_string()))
        };
        match input.and_then(|input| self.surgery.assess(&input)) {
            Ok(interpretation) => ApiResponse::ok(&interpretation),
            Err(e) => ApiResponse::internal(&e),
        }
    }

    /// Static liveness payload.
    #[must_use]
    pub fn health(&self) -> ApiResponse {
        ApiResponse {
            status: 200,
            body: json!({ "status": "healthy", "message": "HemoScan AI API is running" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::surgery::RiskEngine;

    fn heuristic_handler() -> ApiHandler {
        ApiHandler::new(None, SurgeryRiskService::new(RiskEngine::Heuristic))
    }

    #[test]
    fn test_missing_field_is_400_without_model() {
        let body = json!({
            "Gender": "Male", "Age": 40, "RBC": 5.0, "Hemoglobin": 15.0,
            "Hematocrit": 45.0, "MCV": 90.0, "MCHC": 33.0
        });
        let r = heuristic_handler().handle_anemia_request(&body);
        assert_eq!(r.status, 400);
        assert_eq!(r.body, json!({ "error": "Missing field: MCH" }));
    }

    #[test]
    fn test_unloaded_anemia_model_is_500() {
        let body = json!({
            "Gender": "Male", "Age": 40, "RBC": 5.0, "Hemoglobin": 15.0,
            "Hematocrit": 45.0, "MCV": 90.0, "MCH": 30.0, "MCHC": 33.0
        });
        let r = heuristic_handler().handle_anemia_request(&body);
        assert_eq!(r.status, 500);
        assert!(r.body["error"].as_str().is_some_and(|e| e.contains("not loaded")));
    }

    #[test]
    fn test_surgery_empty_body_uses_heuristic_defaults() {
        let r = heuristic_handler().handle_surgery_request(&Value::Null);
        assert_eq!(r.status, 200);
        assert_eq!(r.body["risk_percentage"], json!(67));
        assert_eq!(r.body["zone"], json!("Medium"));
    }

    #[test]
    fn test_surgery_bad_type_is_500() {
        let r = heuristic_handler().handle_surgery_request(&json!({ "pain_level": "severe" }));
        assert_eq!(r.status, 500);
        assert!(r.body.get("error").is_some());
    }

    #[test]
    fn test_health() {
        let r = heuristic_handler().health();
        assert_eq!(r.status, 200);
        assert_eq!(r.body["status"], "healthy");
    }
}
