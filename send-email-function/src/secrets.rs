use crate::settings::EnvironmentError;
use async_trait::async_trait;
use aws_config::{meta::region::RegionProviderChain, BehaviorVersion};
use serde::de::DeserializeOwned;

const DEFAULT_REGION: &str = "eu-north-1";

#[async_trait]
pub trait SecretRepository: Send + Sync {
    async fn open() -> Self;

    async fn get_secret<T: DeserializeOwned>(&self, name: &str) -> Result<T, lambda_http::Error>;
}

pub struct AwsSecretsManagerSecretRepository(aws_sdk_secretsmanager::Client);

#[async_trait]
impl SecretRepository for AwsSecretsManagerSecretRepository {
    async fn open() -> Self {
        let region = RegionProviderChain::default_provider().or_else(DEFAULT_REGION);
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);
        if let Ok(url) = std::env::var("AWS_ENDPOINT_URL") {
            loader = loader.endpoint_url(url);
        }
        let config = loader.load().await;
        let secrets_client = aws_sdk_secretsmanager::Client::new(&config);
        Self(secrets_client)
    }

    async fn get_secret<T: DeserializeOwned>(&self, name: &str) -> Result<T, lambda_http::Error> {
        let secret = self.0.get_secret_value().secret_id(name).send().await?;
        let Some(secret_value) = secret.secret_string() else {
            return Err(Box::new(EnvironmentError::MissingSecret(name.into())));
        };
        Ok(serde_json::from_str(secret_value)?)
    }
}

#[cfg(test)]
pub mod test_support {
    use super::SecretRepository;
    use crate::settings::EnvironmentError;
    use async_trait::async_trait;
    use serde::de::DeserializeOwned;
    use std::{collections::HashMap, sync::Mutex};

    pub const SMTP_CREDENTIALS_NAME: &str = "smtp-credentials";

    /// Holds secrets in memory. Starts out with SMTP credentials under their default name.
    pub struct FakeSecretRepository(Mutex<HashMap<String, String>>);

    impl FakeSecretRepository {
        pub fn remove_secret(&self, name: &str) {
            self.0.lock().unwrap().remove(name);
        }

        pub fn add_secret(&self, name: impl Into<String>, value: impl Into<String>) {
            self.0.lock().unwrap().insert(name.into(), value.into());
        }
    }

    #[async_trait]
    impl SecretRepository for FakeSecretRepository {
        async fn open() -> Self {
            Self(Mutex::new(HashMap::from([(
                SMTP_CREDENTIALS_NAME.into(),
                r#"{
                    "SMTP_USERNAME": "fake SMTP username",
                    "SMTP_PASSWORD": "fake SMTP password"
                }"#
                .into(),
            )])))
        }

        async fn get_secret<T: DeserializeOwned>(
            &self,
            name: &str,
        ) -> Result<T, lambda_http::Error> {
            let Some(string_value) = self.0.lock().unwrap().get(name).cloned() else {
                return Err(Box::new(EnvironmentError::MissingSecret(name.into())));
            };
            Ok(serde_json::from_str(&string_value)?)
        }
    }
}
