//! Vectorization of label masks into GeoJSON polygon features.
//!
//! Connected components of equal, non-background class are traced along the
//! pixel-grid edges that separate them from anything else. The directed
//! boundary edges chain into closed rings; the ring with positive signed
//! area in pixel space is the component's exterior, the rest are holes.
//! Ring vertices are pixel corners mapped through the raster's geotransform.

use std::collections::BTreeMap;

use ndarray::ArrayView2;
use serde_json::{json, Value};
use terraseg_core::LabeledRaster;
use tracing::debug;

/// Integer pixel-corner point, `(col, row)`
type Corner = (i64, i64);

/// A set of GeoJSON features sharing one CRS.
///
/// Kept as a struct rather than raw JSON so region predictions can be
/// concatenated before serialization.
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    /// CRS code of every feature, e.g. "EPSG:3035" (empty when unknown)
    pub crs: String,

    /// GeoJSON Feature objects
    pub features: Vec<Value>,
}

impl FeatureCollection {
    /// An empty collection with the given CRS
    pub fn empty(crs: impl Into<String>) -> Self {
        Self {
            crs: crs.into(),
            features: Vec::new(),
        }
    }

    /// Append all features of `other`, keeping this collection's CRS
    pub fn extend(&mut self, other: FeatureCollection) {
        self.features.extend(other.features);
    }

    /// Number of features
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// True when the collection holds no features
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Serialize as a GeoJSON FeatureCollection object.
    ///
    /// A named-CRS member is included when the CRS is known, matching the
    /// output of the geopandas serializer the downstream consumers expect.
    pub fn to_json(&self) -> Value {
        let mut collection = json!({
            "type": "FeatureCollection",
            "features": self.features,
        });
        if let Some(urn) = crs_urn(&self.crs) {
            collection["crs"] = json!({
                "type": "name",
                "properties": { "name": urn },
            });
        }
        collection
    }
}

/// Convert an "EPSG:nnnn" code to its OGC URN form
fn crs_urn(crs: &str) -> Option<String> {
    let code = crs.strip_prefix("EPSG:")?;
    if code.is_empty() {
        return None;
    }
    Some(format!("urn:ogc:def:crs:EPSG::{}", code))
}

/// Vectorize a label mask into one polygon feature per connected component
/// of non-background (non-zero) class.
pub fn vectorize(raster: &LabeledRaster) -> FeatureCollection {
    let labels = raster.labels.view();
    let (height, width) = labels.dim();
    let mut collection = FeatureCollection::empty(raster.meta.crs.clone());

    let mut component = vec![u32::MAX; height * width];
    let mut next_component = 0u32;

    for r in 0..height {
        for c in 0..width {
            let class = labels[(r, c)];
            if class == 0 || component[r * width + c] != u32::MAX {
                continue;
            }

            let cells = flood_fill(labels, &mut component, next_component, (r, c));
            next_component += 1;

            let rings = trace_rings(&cells, &component, next_component - 1, width, height);
            if let Some(polygon) = assemble_polygon(rings, raster) {
                collection.features.push(json!({
                    "type": "Feature",
                    "geometry": polygon,
                    "properties": { "label": class },
                }));
            }
        }
    }

    debug!(
        image = %raster.meta.image_id,
        features = collection.len(),
        "vectorized label mask"
    );
    collection
}

/// Collect the 4-connected component of equal class starting at `start`,
/// marking visited cells with `id`. Returns the component cells.
fn flood_fill(
    labels: ArrayView2<'_, u8>,
    component: &mut [u32],
    id: u32,
    start: (usize, usize),
) -> Vec<(usize, usize)> {
    let (height, width) = labels.dim();
    let class = labels[start];
    let mut stack = vec![start];
    let mut cells = Vec::new();
    component[start.0 * width + start.1] = id;

    while let Some((r, c)) = stack.pop() {
        cells.push((r, c));
        let mut visit = |nr: usize, nc: usize| {
            if labels[(nr, nc)] == class && component[nr * width + nc] == u32::MAX {
                component[nr * width + nc] = id;
                stack.push((nr, nc));
            }
        };
        if r > 0 {
            visit(r - 1, c);
        }
        if r + 1 < height {
            visit(r + 1, c);
        }
        if c > 0 {
            visit(r, c - 1);
        }
        if c + 1 < width {
            visit(r, c + 1);
        }
    }
    cells
}

/// Trace the boundary of one component into closed corner-point rings.
///
/// Each exposed cell side contributes a directed edge keeping the component
/// interior on its right in image coordinates (y down), which makes exterior
/// rings come out with positive shoelace area.
fn trace_rings(
    cells: &[(usize, usize)],
    component: &[u32],
    id: u32,
    width: usize,
    height: usize,
) -> Vec<Vec<Corner>> {
    let inside = |r: isize, c: isize| -> bool {
        r >= 0
            && c >= 0
            && (r as usize) < height
            && (c as usize) < width
            && component[r as usize * width + c as usize] == id
    };

    // Directed edges keyed by start corner; BTreeMap keeps tracing
    // deterministic across runs.
    let mut edges: BTreeMap<Corner, Vec<Corner>> = BTreeMap::new();
    let mut add_edge = |from: Corner, to: Corner| {
        edges.entry(from).or_default().push(to);
    };

    for &(r, c) in cells {
        let (ri, ci) = (r as isize, c as isize);
        let (x, y) = (c as i64, r as i64);
        if !inside(ri - 1, ci) {
            add_edge((x, y), (x + 1, y)); // top, walked +x
        }
        if !inside(ri, ci + 1) {
            add_edge((x + 1, y), (x + 1, y + 1)); // right, walked +y
        }
        if !inside(ri + 1, ci) {
            add_edge((x + 1, y + 1), (x, y + 1)); // bottom, walked -x
        }
        if !inside(ri, ci - 1) {
            add_edge((x, y + 1), (x, y)); // left, walked -y
        }
    }

    let mut rings = Vec::new();
    while let Some((&start, _)) = edges.iter().next() {
        let mut ring = vec![start];
        let mut current = start;
        loop {
            let next = {
                let targets = edges
                    .get_mut(&current)
                    .expect("boundary edges must chain into closed rings");
                let next = targets.pop().expect("edge list never left empty");
                if targets.is_empty() {
                    edges.remove(&current);
                }
                next
            };
            if next == start {
                break;
            }
            ring.push(next);
            current = next;
        }
        rings.push(simplify_ring(ring));
    }
    rings
}

/// Drop collinear intermediate vertices from a closed ring
fn simplify_ring(ring: Vec<Corner>) -> Vec<Corner> {
    let n = ring.len();
    if n < 4 {
        return ring;
    }
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let prev = ring[(i + n - 1) % n];
        let here = ring[i];
        let next = ring[(i + 1) % n];
        let cross = (here.0 - prev.0) * (next.1 - here.1) - (here.1 - prev.1) * (next.0 - here.0);
        if cross != 0 {
            out.push(here);
        }
    }
    out
}

/// Twice the signed area of a closed ring in pixel coordinates
fn signed_area2(ring: &[Corner]) -> i64 {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (x0, y0) = ring[i];
            let (x1, y1) = ring[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum()
}

/// Build a GeoJSON geometry from traced rings. Positive-area rings are
/// exteriors, negative rings are holes assigned to the exterior containing
/// them. A component pinched at a corner can legitimately trace into more
/// than one exterior ring, which becomes a MultiPolygon.
fn assemble_polygon(rings: Vec<Vec<Corner>>, raster: &LabeledRaster) -> Option<Value> {
    let mut exteriors: Vec<Vec<Corner>> = Vec::new();
    let mut holes: Vec<Vec<Corner>> = Vec::new();

    for ring in rings {
        if signed_area2(&ring) > 0 {
            exteriors.push(ring);
        } else {
            holes.push(ring);
        }
    }
    if exteriors.is_empty() {
        return None;
    }

    // Pair each hole with the exterior ring that contains it. The probe
    // point sits just inside the parent, on the right-hand side of the
    // hole's first edge (component interior is on the right by tracing).
    let mut polygons: Vec<Vec<Vec<Corner>>> =
        exteriors.into_iter().map(|e| vec![e]).collect();
    for hole in holes {
        let probe = interior_probe(&hole);
        let parent = polygons
            .iter()
            .position(|rings| contains_point(&rings[0], probe))
            .unwrap_or(0);
        polygons[parent].push(hole);
    }

    let to_coords = |ring: &[Corner]| -> Vec<[f64; 2]> {
        let mut coords: Vec<[f64; 2]> = ring
            .iter()
            .map(|&(x, y)| {
                let (gx, gy) = raster.meta.transform.pixel_to_coords(x as f64, y as f64);
                [gx, gy]
            })
            .collect();
        // GeoJSON rings are explicitly closed
        if let Some(&first) = coords.first() {
            coords.push(first);
        }
        coords
    };

    if polygons.len() == 1 {
        let coordinates: Vec<Vec<[f64; 2]>> =
            polygons[0].iter().map(|r| to_coords(r)).collect();
        Some(json!({
            "type": "Polygon",
            "coordinates": coordinates,
        }))
    } else {
        let coordinates: Vec<Vec<Vec<[f64; 2]>>> = polygons
            .iter()
            .map(|rings| rings.iter().map(|r| to_coords(r)).collect())
            .collect();
        Some(json!({
            "type": "MultiPolygon",
            "coordinates": coordinates,
        }))
    }
}

/// A point strictly on the parent-interior side of a hole ring's first edge
fn interior_probe(hole: &[Corner]) -> (f64, f64) {
    let (x0, y0) = hole[0];
    let (x1, y1) = hole[1 % hole.len()];
    let (mx, my) = ((x0 + x1) as f64 / 2.0, (y0 + y1) as f64 / 2.0);
    let len = (((x1 - x0).pow(2) + (y1 - y0).pow(2)) as f64).sqrt();
    // Right-hand normal in image coordinates (y down)
    let (nx, ny) = (-(y1 - y0) as f64 / len, (x1 - x0) as f64 / len);
    (mx + nx * 0.25, my + ny * 0.25)
}

/// Even-odd ray cast of `point` against a closed integer-corner ring
fn contains_point(ring: &[Corner], point: (f64, f64)) -> bool {
    let (px, py) = point;
    let n = ring.len();
    let mut inside = false;
    for i in 0..n {
        let (x0, y0) = (ring[i].0 as f64, ring[i].1 as f64);
        let j = (i + 1) % n;
        let (x1, y1) = (ring[j].0 as f64, ring[j].1 as f64);
        if (y0 > py) != (y1 > py) {
            let x_cross = x0 + (py - y0) / (y1 - y0) * (x1 - x0);
            if px < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}
