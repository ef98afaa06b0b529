//! Image export.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::{ColorType, ImageFormat};

use crate::{Pixels, RenderError, RenderResult};

/// Write `pixels` as a binary PPM (P6), top row first.
pub fn write_ppm<W: Write>(pixels: &Pixels, mut writer: W) -> RenderResult<()> {
    write!(writer, "P6\n{} {}\n255\n", pixels.width(), pixels.height())?;
    for y in 0..pixels.height() {
        writer.write_all(&pixels.rgb_row(y))?;
    }
    writer.flush()?;
    Ok(())
}

/// Save `pixels` to `path`, choosing the format from the extension.
///
/// `.ppm` or no extension writes PPM; anything else goes through the `image`
/// crate. The file is written beside the target and renamed into place, so
/// a failed save never leaves a partial image at `path`.
pub fn save_image<P: AsRef<Path>>(pixels: &Pixels, path: P) -> RenderResult<()> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let format = match extension.as_deref() {
        None | Some("ppm") => None,
        Some(ext) => Some(
            ImageFormat::from_extension(ext)
                .ok_or_else(|| RenderError::UnsupportedFormat(ext.to_string()))?,
        ),
    };

    let temp = temp_path(path);
    let result = match format {
        None => write_ppm_file(pixels, &temp),
        Some(format) => image::save_buffer_with_format(
            &temp,
            &pixels.to_rgb8(),
            pixels.width(),
            pixels.height(),
            ColorType::Rgb8,
            format,
        )
        .map_err(RenderError::from),
    };

    if let Err(err) = result.and_then(|()| fs::rename(&temp, path).map_err(RenderError::from)) {
        let _ = fs::remove_file(&temp);
        return Err(err);
    }

    log::info!("Saved {}x{} image to {:?}", pixels.width(), pixels.height(), path);
    Ok(())
}

fn write_ppm_file(pixels: &Pixels, path: &Path) -> RenderResult<()> {
    let file = File::create(path)?;
    write_ppm(pixels, BufWriter::new(file))
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}
