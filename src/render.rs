use anyhow::Result;
use std::path::Path;

const SVG_NS: &str = "http://www.w3.org/2000/svg";

/// Adds the SVG namespace to the outer element when the markup lacks one,
/// so a proxy cloned out of an HTML page parses as a standalone file.
pub fn standalone_svg(markup: &str) -> String {
    let trimmed = markup.trim_start();
    let Some(rest) = trimmed.strip_prefix("<svg") else {
        return markup.to_string();
    };
    let head_end = rest.find('>').unwrap_or(rest.len());
    if rest[..head_end].contains("xmlns=") {
        return markup.to_string();
    }
    format!("<svg xmlns=\"{SVG_NS}\"{rest}")
}

pub fn write_output_svg(svg: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, svg)?;
        }
        None => {
            println!("{}", svg);
        }
    }
    Ok(())
}

#[cfg(feature = "png")]
pub fn write_output_png(svg: &str, output: &Path) -> Result<()> {
    let opt = usvg::Options::default();
    let tree = usvg::Tree::from_str(&standalone_svg(svg), &opt)?;
    let size = tree.size().to_int_size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| anyhow::anyhow!("Failed to allocate pixmap"))?;

    let mut pixmap_mut = pixmap.as_mut();
    resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap_mut);
    pixmap.save_png(output)?;
    Ok(())
}

#[cfg(not(feature = "png"))]
pub fn write_output_png(_svg: &str, _output: &Path) -> Result<()> {
    Err(anyhow::anyhow!("PNG output requires the `png` feature"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_missing_namespace() {
        assert_eq!(
            standalone_svg(r#"<svg width="5"><rect/></svg>"#),
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="5"><rect/></svg>"#
        );
    }

    #[test]
    fn keeps_existing_namespace() {
        let markup = r#"<svg xmlns="http://www.w3.org/2000/svg"/>"#;
        assert_eq!(standalone_svg(markup), markup);
    }

    #[test]
    fn writes_svg_files() {
        let dir = std::env::temp_dir().join(format!("dragsvg-render-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("proxy.svg");
        write_output_svg("<svg/>", Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<svg/>");
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
