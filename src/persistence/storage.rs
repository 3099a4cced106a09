// ============================================================================
// Storage : répertoire de données de l'application
// ============================================================================
// Tous les fichiers persistés vivent à plat dans un même répertoire :
// - config.json    : paramètres
// - coins.json     : watchlist sauvegardée
// - cache_<nom>    : icônes en cache (un fichier par icône, pas d'index)
// - logs/          : fichiers de log
//
// Emplacement :
// 1. $COINWATCHER_DATA_DIR si défini
// 2. Linux : ~/.local/share/coinwatcher
//    macOS : ~/Library/Application Support/coinwatcher
//    Windows : C:\Users\<user>\AppData\Roaming\coinwatcher
// 3. ./.coinwatcher en dernier recours
// ============================================================================

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};

/// Variable d'environnement qui remplace le répertoire de données
pub const DATA_DIR_ENV: &str = "COINWATCHER_DATA_DIR";

/// Compteur des fichiers temporaires du processus
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Répertoire de stockage clé -> fichier
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Résout le répertoire de données depuis l'environnement
    pub fn from_env() -> Self {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                return Self::new(dir);
            }
        }

        match dirs::data_dir() {
            Some(dir) => Self::new(dir.join("coinwatcher")),
            None => Self::new(".coinwatcher"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Chemin du fichier associé à une clé
    pub fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.path(key).is_file()
    }

    /// Lit le contenu d'un fichier
    pub fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path(key);
        fs::read(&path).with_context(|| format!("Impossible de lire {}", path.display()))
    }

    /// Écrit un fichier (via un fichier temporaire + rename)
    ///
    /// Un lecteur ne voit jamais un fichier à moitié écrit. Chaque écriture a
    /// son propre fichier temporaire : deux écritures concurrentes de la même
    /// clé publient chacune un fichier complet.
    pub fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Impossible de créer {}", self.root.display()))?;

        let path = self.path(key);
        let tmp = self.path(&tmp_name(key));
        if let Err(e) = fs::write(&tmp, bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(e).with_context(|| format!("Impossible d'écrire {}", tmp.display()));
        }
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e).with_context(|| format!("Impossible de renommer vers {}", path.display()));
        }
        Ok(())
    }
}

/// ".<clé>.<pid>.<n>.tmp"
fn tmp_name(key: &str) -> String {
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(".{}.{}.{}.tmp", key, std::process::id(), n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join("nested"));

        assert!(!storage.exists("config.json"));
        storage.write("config.json", b"{}").unwrap();
        assert!(storage.exists("config.json"));
        assert_eq!(storage.read("config.json").unwrap(), b"{}");
        // Pas de fichier temporaire résiduel
        let leftovers = fs::read_dir(storage.root())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_tmp_names_are_unique() {
        assert_ne!(tmp_name("cache_1.png"), tmp_name("cache_1.png"));
        assert!(tmp_name("config.json").starts_with(".config.json."));
    }

    #[test]
    fn test_concurrent_writes_same_key() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        let payloads: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; 64 * 1024]).collect();

        std::thread::scope(|scope| {
            let handles: Vec<_> = payloads
                .iter()
                .map(|bytes| {
                    let storage = storage.clone();
                    scope.spawn(move || {
                        for _ in 0..10 {
                            storage.write("cache_1.png", bytes).unwrap();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        });

        // Le fichier final est l'une des écritures, complète
        let written = storage.read("cache_1.png").unwrap();
        assert!(payloads.contains(&written));
    }

    #[test]
    fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        let err = storage.read("missing.json").unwrap_err();
        assert!(err.to_string().contains("missing.json"));
    }
}
