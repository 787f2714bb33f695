use crate::error::Result;
use ddsfile::{AlphaMode, D3D10ResourceDimension, Dds, DxgiFormat, NewDxgiParams};
use std::path::Path;

/// Write single-channel float heights as an R32F texture.
pub fn write_heightmap_dds(path: &Path, width: u32, height: u32, data: &[f32]) -> Result<()> {
    let mut bytes = Vec::with_capacity(data.len() * 4);
    for &value in data {
        bytes.extend_from_slice(&value.to_le_bytes());
    }

    let params = NewDxgiParams {
        height,
        width,
        depth: None,
        format: DxgiFormat::R32_Float,
        mipmap_levels: Some(1),
        array_layers: Some(1),
        caps2: None,
        is_cubemap: false,
        resource_dimension: D3D10ResourceDimension::Texture2D,
        alpha_mode: AlphaMode::Unknown,
    };

    let mut dds = Dds::new_dxgi(params)?;
    dds.data = bytes;
    dds.write(&mut std::fs::File::create(path)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_texture_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.dds");
        let heights = [0.0f32, 0.25, 0.5, 1.0, 0.75, 0.125];
        write_heightmap_dds(&path, 3, 2, &heights).unwrap();

        let dds = Dds::read(&mut std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(dds.get_width(), 3);
        assert_eq!(dds.get_height(), 2);
        assert_eq!(dds.get_dxgi_format(), Some(DxgiFormat::R32_Float));
        let first = f32::from_le_bytes(dds.data[4..8].try_into().unwrap());
        assert_eq!(first, 0.25);
    }
}
