// ============================================================================
// Téléchargement des icônes
// ============================================================================
// Source réseau des logos de coins, derrière un trait pour pouvoir être
// remplacée dans les tests (aucun accès réseau en test).
// ============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::api::build_http_client;

/// Source des octets bruts d'une icône
#[async_trait]
pub trait IconSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Téléchargement HTTP (même timeout de 5 s que le fournisseur)
pub struct HttpIconSource {
    client: reqwest::Client,
}

impl HttpIconSource {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_http_client().context("Échec de la création du client HTTP")?,
        })
    }
}

#[async_trait]
impl IconSource for HttpIconSource {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Échec du téléchargement de l'icône")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Le serveur d'icônes a retourné une erreur : HTTP {}", status);
        }

        let bytes = response
            .bytes()
            .await
            .context("Échec de la lecture du corps de l'icône")?;
        debug!(bytes = bytes.len(), "Icon downloaded");
        Ok(bytes.to_vec())
    }
}
