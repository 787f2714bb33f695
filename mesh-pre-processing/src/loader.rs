/// Wavefront OBJ loading into flat mesh buffers
use crate::error::{Error, Result};
use crate::mesh::{Face, Mesh};
use glam::Vec3;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Load an OBJ file. Groups and objects are flattened into one mesh.
pub fn load_mesh(path: impl AsRef<Path>) -> Result<Mesh> {
    let path = path.as_ref();
    log::info!("Loading mesh from {}", path.display());

    let file = File::open(path)?;
    let mesh = parse_obj(BufReader::new(file))?;

    log::info!(
        "Loaded {} vertices and {} faces",
        mesh.vertex_count(),
        mesh.face_count()
    );
    Ok(mesh)
}

/// Parse OBJ text. Only `v` and `f` statements are interpreted; polygons are
/// fan-triangulated around their first corner.
pub fn parse_obj(reader: impl BufRead) -> Result<Mesh> {
    let mut mesh = Mesh::default();
    let mut corners: Vec<u32> = Vec::with_capacity(4);
    // Highest vertex index seen and the line it first appeared on. Checked
    // once all vertices are known, so forward references still parse.
    let mut highest: Option<(u32, usize)> = None;

    for (line_index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = line_index + 1;
        let mut tokens = line.split_whitespace();

        match tokens.next() {
            Some("v") => {
                let mut coords = [0.0f32; 3];
                for coord in &mut coords {
                    let token = tokens
                        .next()
                        .ok_or_else(|| parse_error(line_number, "vertex needs three coordinates"))?;
                    *coord = token.parse().map_err(|_| {
                        parse_error(line_number, format!("invalid coordinate '{token}'"))
                    })?;
                }
                mesh.vertices.push(Vec3::from_array(coords));
            }
            Some("f") => {
                corners.clear();
                for token in tokens {
                    corners.push(resolve_index(token, mesh.vertex_count(), line_number)?);
                }
                if corners.len() < 3 {
                    return Err(parse_error(line_number, "face needs at least three vertices"));
                }
                if let Some(&max) = corners.iter().max() {
                    if highest.is_none_or(|(seen, _)| max > seen) {
                        highest = Some((max, line_number));
                    }
                }
                mesh.faces.extend(fan(&corners));
            }
            _ => {}
        }
    }

    if let Some((index, line)) = highest {
        if index as usize >= mesh.vertex_count() {
            return Err(parse_error(
                line,
                format!(
                    "face index {} is past the last of {} vertices",
                    index as u64 + 1,
                    mesh.vertex_count()
                ),
            ));
        }
    }

    Ok(mesh)
}

/// Vertex index of an `i`, `i/t`, `i//n` or `i/t/n` token. Negative indices
/// count back from the most recent vertex.
fn resolve_index(token: &str, vertex_count: usize, line: usize) -> Result<u32> {
    let position = token.split('/').next().unwrap_or(token);
    let index: i64 = position
        .parse()
        .map_err(|_| parse_error(line, format!("invalid face index '{token}'")))?;

    let resolved = match index {
        0 => return Err(parse_error(line, "face indices are 1-based")),
        i if i > 0 => i - 1,
        i => vertex_count as i64 + i,
    };

    u32::try_from(resolved)
        .map_err(|_| parse_error(line, format!("face index '{token}' is out of range")))
}

fn fan(corners: &[u32]) -> impl Iterator<Item = Face> + '_ {
    corners
        .windows(2)
        .skip(1)
        .map(move |pair| [corners[0], pair[0], pair[1]])
}

fn parse_error(line: usize, reason: impl Into<String>) -> Error {
    Error::MeshParse {
        line,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(text: &str) -> Result<Mesh> {
        parse_obj(Cursor::new(text))
    }

    #[test]
    fn parses_vertices_and_triangles() {
        let mesh = parse("# tri\nv 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf 1 2 3\n").unwrap();
        assert_eq!(mesh.vertices, vec![Vec3::ZERO, Vec3::X, Vec3::Y]);
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
    }

    #[test]
    fn quads_are_fan_triangulated() {
        let mesh = parse("v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n").unwrap();
        assert_eq!(mesh.faces, vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn slashed_and_negative_indices() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nf 1/1 2//1 3/1/1\nf -3 -2 -1\n";
        let mesh = parse(text).unwrap();
        assert_eq!(mesh.faces, vec![[0, 1, 2], [0, 1, 2]]);
    }

    #[test]
    fn groups_are_flattened() {
        let text = "o a\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\ng b\nv 0 0 1\nf 1 2 4\n";
        let mesh = parse(text).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.faces, vec![[0, 1, 2], [0, 1, 3]]);
    }

    #[test]
    fn malformed_lines_report_line_number() {
        match parse("v 0 0 0\nv 1 x 0\n") {
            Err(Error::MeshParse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            parse("v 0 0 0\nv 1 0 0\nf 1 2\n"),
            Err(Error::MeshParse { line: 3, .. })
        ));
        assert!(matches!(
            parse("v 0 0 0\nf 0 1 1\n"),
            Err(Error::MeshParse { line: 2, .. })
        ));
    }

    #[test]
    fn indices_past_the_last_vertex_are_rejected() {
        assert!(matches!(
            parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\n"),
            Err(Error::MeshParse { line: 4, .. })
        ));
        assert!(matches!(
            parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\nf 2 3 4\nf 1 2 3\n"),
            Err(Error::MeshParse { line: 5, .. })
        ));
    }

    #[test]
    fn forward_references_resolve_once_vertices_arrive() {
        let mesh = parse("v 0 0 0\nf 1 2 3\nv 1 0 0\nv 0 1 0\n").unwrap();
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            load_mesh("/nonexistent/mesh.obj"),
            Err(Error::Io(_))
        ));
    }
}
