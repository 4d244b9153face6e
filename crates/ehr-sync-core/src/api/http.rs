//! HTTP implementation of the record service client.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{paths, ApiError, ApiResult, RecordsApi};
use crate::config::ClientConfig;
use crate::models::{Diagnosis, DiagnosisId, EntityId, Patient, PatientId};

/// Record service client speaking JSON over HTTP.
#[derive(Clone)]
pub struct HttpRecordsApi {
    http_client: Client,
    config: ClientConfig,
}

impl HttpRecordsApi {
    /// Create a client for the configured base URL.
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        self.config.endpoint(path)
    }

    /// Decode a JSON body from a successful response.
    async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
        let response = Self::check_status(response).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Map non-success statuses to `ApiError::Server`.
    async fn check_status(response: Response) -> ApiResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Server {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl RecordsApi for HttpRecordsApi {
    async fn list_patients(&self) -> ApiResult<Vec<Patient>> {
        let url = self.url(&paths::patients());
        debug!("GET {}", url);
        let response = self.http_client.get(&url).send().await?;
        Self::decode(response).await
    }

    async fn get_patient(&self, id: PatientId) -> ApiResult<Patient> {
        let url = self.url(&paths::patient(id));
        debug!("GET {}", url);
        let response = self.http_client.get(&url).send().await?;
        Self::decode(response).await
    }

    async fn create_patient(&self, patient: &Patient) -> ApiResult<Patient> {
        let url = self.url(&paths::patients());
        debug!("POST {}", url);
        let body = Patient {
            id: EntityId::Unassigned,
            ..patient.clone()
        };
        let response = self.http_client.post(&url).json(&body).send().await?;
        Self::decode(response).await
    }

    async fn update_patient(&self, id: PatientId, patient: &Patient) -> ApiResult<Patient> {
        let url = self.url(&paths::patient(id));
        debug!("PUT {}", url);
        let body = patient.clone().with_id(id);
        let response = self.http_client.put(&url).json(&body).send().await?;
        Self::decode(response).await
    }

    async fn delete_patient(&self, id: PatientId) -> ApiResult<()> {
        let url = self.url(&paths::patient(id));
        debug!("DELETE {}", url);
        let response = self.http_client.delete(&url).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn list_diagnoses(&self, patient_id: PatientId) -> ApiResult<Vec<Diagnosis>> {
        let url = self.url(&paths::diagnoses(patient_id));
        debug!("GET {}", url);
        let response = self.http_client.get(&url).send().await?;
        Self::decode(response).await
    }

    async fn create_diagnosis(
        &self,
        patient_id: PatientId,
        diagnosis: &Diagnosis,
    ) -> ApiResult<Diagnosis> {
        let url = self.url(&paths::diagnoses(patient_id));
        debug!("POST {}", url);
        let body = Diagnosis {
            id: EntityId::Unassigned,
            name: diagnosis.name.clone(),
            patient_id: Some(patient_id),
        };
        let response = self.http_client.post(&url).json(&body).send().await?;
        Self::decode(response).await
    }

    async fn delete_diagnosis(
        &self,
        patient_id: PatientId,
        diagnosis_id: DiagnosisId,
    ) -> ApiResult<()> {
        let url = self.url(&paths::diagnosis(patient_id, diagnosis_id));
        debug!("DELETE {}", url);
        let response = self.http_client.delete(&url).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }
}
