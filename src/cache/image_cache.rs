// ============================================================================
// ImageCache : cache des icônes à deux niveaux
// ============================================================================
// URL de l'icône -> bitmap décodé
//
// 1. Mémoire : HashMap protégée par un Mutex, durée de vie = processus
// 2. Disque  : un fichier PNG par icône dans le répertoire de données,
//              jamais évincé, seulement réécrit par un nouveau téléchargement
//
// Clé de cache : "cache_" + dernier segment du chemin de l'URL.
// Deux URLs différentes qui finissent par le même nom de fichier partagent
// donc la même entrée (ex: .../64x64/1.png et .../128x128/1.png).
//
// load/save sont bloquants (disque, codec PNG). Depuis du code async on passe
// par load_async/save_async, exécutés sur le pool bloquant de tokio.
// ============================================================================

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use image::{DynamicImage, ImageFormat};
use tracing::{debug, error};
use url::Url;

use crate::persistence::Storage;

/// Bitmap décodé d'une icône
pub type Bitmap = DynamicImage;

/// Dérive la clé de cache d'une URL
///
/// # Exemple
/// cache_key("https://s2.coinmarketcap.com/static/img/coins/64x64/1.png") == "cache_1.png"
pub fn cache_key(url: &str) -> String {
    let tail = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last().map(str::to_string))
        })
        .unwrap_or_else(|| {
            url.trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string()
        });

    if tail.is_empty() {
        "cache_icon".to_string()
    } else {
        format!("cache_{}", tail)
    }
}

/// Cache d'icônes mémoire + disque
///
/// Les clones partagent le même niveau mémoire.
#[derive(Clone)]
pub struct ImageCache {
    storage: Storage,
    memory: Arc<Mutex<HashMap<String, Bitmap>>>,
}

impl ImageCache {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            memory: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// `load` hors des threads du runtime
    pub async fn load_async(&self, url: &str) -> Option<Bitmap> {
        let cache = self.clone();
        let url = url.to_string();
        match tokio::task::spawn_blocking(move || cache.load(&url)).await {
            Ok(bitmap) => bitmap,
            Err(e) => {
                error!(error = %e, "Icon cache lookup task failed");
                None
            }
        }
    }

    /// `save` hors des threads du runtime
    pub async fn save_async(&self, url: &str, bitmap: Bitmap) {
        let cache = self.clone();
        let url = url.to_string();
        if let Err(e) = tokio::task::spawn_blocking(move || cache.save(&url, &bitmap)).await {
            error!(error = %e, "Icon cache write task failed");
        }
    }

    /// Cherche une icône : mémoire d'abord, puis disque
    ///
    /// Retourne None (NotFound) pour toute erreur : fichier absent,
    /// décodage impossible... l'appelant passe au téléchargement.
    pub fn load(&self, url: &str) -> Option<Bitmap> {
        let key = cache_key(url);

        if let Some(bitmap) = self.lock().get(&key) {
            return Some(bitmap.clone());
        }

        // Lecture disque hors du verrou
        let bytes = match self.storage.read(&key) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(key = %key, error = %e, "Icon not in disk cache");
                return None;
            }
        };

        let bitmap = match image::load_from_memory(&bytes) {
            Ok(bitmap) => bitmap,
            Err(e) => {
                error!(key = %key, error = %e, "Failed decoding cached icon");
                return None;
            }
        };

        self.lock().insert(key, bitmap.clone());
        Some(bitmap)
    }

    /// Enregistre une icône
    ///
    /// La mémoire est mise à jour immédiatement ; l'écriture disque est
    /// best-effort (erreurs loguées, jamais retournées).
    pub fn save(&self, url: &str, bitmap: &Bitmap) {
        let key = cache_key(url);
        self.lock().insert(key.clone(), bitmap.clone());

        let mut png = Vec::new();
        if let Err(e) = bitmap.write_to(&mut Cursor::new(&mut png), ImageFormat::Png) {
            error!(key = %key, error = %e, "Failed encoding png");
            return;
        }

        if let Err(e) = self.storage.write(&key, &png) {
            error!(key = %key, error = %e, "Failed writing image to cache");
        }
    }

    /// Nombre d'icônes en mémoire
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Bitmap>> {
        self.memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ============================================================================
// Tests unitaires
// ============================================================================
