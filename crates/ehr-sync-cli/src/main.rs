use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ehr_sync_core::api::HttpRecordsApi;
use ehr_sync_core::config::ClientConfig;
use ehr_sync_core::gateway::SyncGateway;
use ehr_sync_core::models::{DiagnosisDraft, DiagnosisId, PatientId};
use ehr_sync_llm::{SuggestionConfig, SuggestionGateway};

type Gateway = SyncGateway<HttpRecordsApi>;

#[derive(Parser)]
#[command(name = "ehr-sync")]
#[command(about = "Patient and diagnosis record client")]
struct Cli {
    /// Record service base URL (overrides EHR_API_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all patients
    List,
    /// Create a patient
    AddPatient {
        name: String,
        ssn: String,
        #[arg(long)]
        age: Option<i64>,
    },
    /// Replace fields of a stored patient
    UpdatePatient {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        age: Option<i64>,
        #[arg(long)]
        ssn: Option<String>,
    },
    /// Delete a patient and their diagnoses
    DeletePatient { id: i64 },
    /// List a patient's diagnoses
    Diagnoses { patient_id: i64 },
    /// Add a diagnosis, typed or suggested from a condition description
    AddDiagnosis {
        patient_id: i64,
        /// Diagnosis text, e.g. "E11.9 Type 2 diabetes mellitus"
        name: Option<String>,
        /// Free-text condition to get a suggested code for
        #[arg(long, conflicts_with = "name")]
        suggest: Option<String>,
    },
    /// Delete one diagnosis
    DeleteDiagnosis { patient_id: i64, diagnosis_id: i64 },
    /// Suggest an ICD-10 code for a condition without storing it
    Suggest { condition: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ehr_sync=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'ehr-sync --help' for commands");
        return Ok(());
    };

    let config = client_config(cli.base_url.as_deref(), cli.timeout)?;
    info!("Using record service at {}", config.base_url());
    let gateway = SyncGateway::spawn(HttpRecordsApi::new(config)?);

    match command {
        Commands::List => {
            gateway.fetch_patients().wait().await?;
            print_patients(&gateway);
        }
        Commands::AddPatient { name, ssn, age } => {
            gateway.fetch_patients().wait().await?;
            gateway.create_patient(&name, age, &ssn).wait().await?;
            print_patients(&gateway);
        }
        Commands::UpdatePatient { id, name, age, ssn } => {
            let id = PatientId(id);
            gateway.fetch_patient(id).wait().await?;
            let mut patient = gateway
                .patient(id)
                .with_context(|| format!("patient {} not found", id))?;
            if let Some(name) = name {
                patient.name = name;
            }
            if age.is_some() {
                patient.age = age;
            }
            if let Some(ssn) = ssn {
                patient.ssn = ssn;
            }
            gateway.update_patient(id, patient).wait().await?;
            print_patients(&gateway);
        }
        Commands::DeletePatient { id } => {
            gateway.fetch_patients().wait().await?;
            gateway.delete_patient(PatientId(id)).wait().await?;
            print_patients(&gateway);
        }
        Commands::Diagnoses { patient_id } => {
            let patient_id = PatientId(patient_id);
            gateway.fetch_diagnoses(patient_id).wait().await?;
            print_diagnoses(&gateway, patient_id);
        }
        Commands::AddDiagnosis {
            patient_id,
            name,
            suggest,
        } => {
            let patient_id = PatientId(patient_id);
            let mut draft = DiagnosisDraft::new(patient_id);
            if let Some(name) = name {
                draft.set_name(name);
            }
            if let Some(condition) = suggest {
                draft.set_condition(condition.as_str());
                let suggestions = SuggestionGateway::http(SuggestionConfig::from_env()?)?;
                match suggestions.suggest_diagnosis(&condition).await {
                    Some(text) => draft.apply_suggestion(text),
                    None => bail!("no suggestion available for '{}'", condition),
                }
            }
            if !draft.is_submittable() {
                bail!("give a diagnosis name or --suggest <condition>");
            }

            gateway.fetch_diagnoses(patient_id).wait().await?;
            gateway.submit_draft(&draft).wait().await?;
            print_diagnoses(&gateway, patient_id);
        }
        Commands::DeleteDiagnosis {
            patient_id,
            diagnosis_id,
        } => {
            let patient_id = PatientId(patient_id);
            gateway
                .delete_diagnosis(patient_id, DiagnosisId(diagnosis_id))
                .wait()
                .await?;
            print_diagnoses(&gateway, patient_id);
        }
        Commands::Suggest { condition } => suggest(&condition).await?,
    }

    Ok(())
}

fn client_config(base_url: Option<&str>, timeout: Option<u64>) -> anyhow::Result<ClientConfig> {
    let env = ClientConfig::from_env()?;
    if base_url.is_none() && timeout.is_none() {
        return Ok(env);
    }
    let url = base_url.unwrap_or(env.base_url());
    let timeout = timeout
        .map(Duration::from_secs)
        .unwrap_or(env.request_timeout());
    Ok(ClientConfig::new(url, timeout)?)
}

async fn suggest(condition: &str) -> anyhow::Result<()> {
    let gateway = SuggestionGateway::http(SuggestionConfig::from_env()?)?;
    match gateway.try_suggest(condition).await {
        Ok(suggestion) => println!("{}", suggestion.text()),
        Err(e) => println!("No suggestion available ({})", e),
    }
    Ok(())
}

fn print_patients(gateway: &Gateway) {
    let patients = gateway.patients();
    if patients.is_empty() {
        println!("No patients found.");
        return;
    }
    for patient in patients {
        let id = patient.id().map(|id| id.to_string()).unwrap_or_default();
        let age = patient.age.map(|a| a.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "ID: {}, Name: {}, Age: {}, SSN: {}",
            id, patient.name, age, patient.ssn
        );
    }
}

fn print_diagnoses(gateway: &Gateway, patient_id: PatientId) {
    let diagnoses = gateway.diagnoses_for(patient_id);
    if diagnoses.is_empty() {
        println!("No diagnoses for patient {}.", patient_id);
        return;
    }
    for diagnosis in diagnoses {
        let id = diagnosis.id().map(|id| id.to_string()).unwrap_or_default();
        println!("ID: {}, Diagnosis: {}", id, diagnosis.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_add_diagnosis_name_conflicts_with_suggest() {
        let result = Cli::try_parse_from([
            "ehr-sync",
            "add-diagnosis",
            "7",
            "J45 Asthma",
            "--suggest",
            "wheezing",
        ]);
        let err = result.err().expect("name and --suggest together must be rejected");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_add_diagnosis_accepts_either_source() {
        let typed = Cli::try_parse_from(["ehr-sync", "add-diagnosis", "7", "J45 Asthma"]).unwrap();
        assert!(matches!(
            typed.command,
            Some(Commands::AddDiagnosis { patient_id: 7, name: Some(_), suggest: None })
        ));

        let suggested =
            Cli::try_parse_from(["ehr-sync", "add-diagnosis", "7", "--suggest", "wheezing"])
                .unwrap();
        assert!(matches!(
            suggested.command,
            Some(Commands::AddDiagnosis { name: None, suggest: Some(_), .. })
        ));
    }
}
