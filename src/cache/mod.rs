// ============================================================================
// Module : cache
// ============================================================================
// Cache des icônes et résolution d'une icône avec repli :
//   cache -> téléchargement -> décodage -> sauvegarde
// avec une image de remplacement (32x32 vide) si tout échoue.
// ============================================================================

use image::DynamicImage;
use tracing::{debug, warn};

use crate::api::IconSource;

pub mod image_cache;

pub use image_cache::{cache_key, Bitmap, ImageCache};

/// Taille de l'image de remplacement
pub const PLACEHOLDER_SIZE: u32 = 32;

/// Image de remplacement : 32x32 niveaux de gris, vide
pub fn placeholder() -> Bitmap {
    DynamicImage::new_luma8(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE)
}

/// Résout l'icône d'une URL
///
/// Ne retourne jamais d'erreur : l'UI reçoit toujours une image.
pub async fn resolve_icon(cache: &ImageCache, source: &dyn IconSource, url: &str) -> Bitmap {
    if let Some(bitmap) = cache.load_async(url).await {
        return bitmap;
    }

    let bytes = match source.fetch(url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(url = %url, error = %e, "No icon");
            return placeholder();
        }
    };

    let bitmap = match image::load_from_memory(&bytes) {
        Ok(bitmap) => bitmap,
        Err(e) => {
            warn!(url = %url, error = %e, "No icon");
            return placeholder();
        }
    };

    debug!(url = %url, w = bitmap.width(), h = bitmap.height(), "icon img");
    cache.save_async(url, bitmap.clone()).await;
    bitmap
}

/// Couleur moyenne des pixels visibles (alpha > 0)
///
/// Sert à dessiner l'icône dans le terminal sous forme de pastille colorée.
/// None si l'image est entièrement transparente ou vide.
pub fn average_rgb(bitmap: &Bitmap) -> Option<(u8, u8, u8)> {
    let rgba = bitmap.to_rgba8();
    let (mut r, mut g, mut b, mut weight) = (0u64, 0u64, 0u64, 0u64);

    for pixel in rgba.pixels() {
        let [pr, pg, pb, pa] = pixel.0;
        let a = pa as u64;
        r += pr as u64 * a;
        g += pg as u64 * a;
        b += pb as u64 * a;
        weight += a;
    }

    if weight == 0 {
        return None;
    }
    Some(((r / weight) as u8, (g / weight) as u8, (b / weight) as u8))
}

// ============================================================================
// Tests
// ============================================================================
