//! SPIR-V loading
//!
//! Shader files are opaque word blobs; nothing here looks at the instructions.

use std::fs::File;
use std::path::Path;

use crate::render::{VulkanError, VulkanResult};

/// Read a compiled SPIR-V file into aligned words
pub fn load_spirv<P: AsRef<Path>>(path: P) -> VulkanResult<Vec<u32>> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| {
        VulkanError::AssetLoad(format!("Failed to open shader {}: {}", path.display(), e))
    })?;
    let words = ash::util::read_spv(&mut file)?;
    log::debug!("Loaded shader {} ({} words)", path.display(), words.len());
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_spirv_words() {
        let dir = std::env::temp_dir().join(format!("vk_engine_shader_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("blob.spv");
        let words: [u32; 3] = [0x0723_0203, 0x0001_0000, 42];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        std::fs::write(&path, bytes).unwrap();

        assert_eq!(load_spirv(&path).unwrap(), words.to_vec());

        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        assert!(load_spirv(&path).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_shader() {
        assert!(matches!(load_spirv("missing.spv"), Err(VulkanError::AssetLoad(_))));
    }
}
