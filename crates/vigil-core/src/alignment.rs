//! Face alignment to the ArcFace 112×112 template.
//!
//! Fits a similarity transform (scale, rotation, translation) from the five
//! detected landmarks to the reference points, then warps the RGB frame.

use crate::decode::Frame;

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: usize = 112;

/// `dst = [[a, -b], [b, a]] * src + (tx, ty)`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Closed-form least-squares fit over centred point sets.
    ///
    /// Treating points as complex numbers, `a + ib = Σ conj(s) d / Σ |s|²`.
    fn fit(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        let centroid = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / 5.0, sy / 5.0)
        };
        let (sxm, sym) = centroid(src);
        let (dxm, dym) = centroid(dst);

        let (mut num_a, mut num_b, mut den) = (0.0f32, 0.0f32, 0.0f32);
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            let (sx, sy, dx, dy) = (sx - sxm, sy - sym, dx - dxm, dy - dym);
            num_a += sx * dx + sy * dy;
            num_b += sx * dy - sy * dx;
            den += sx * sx + sy * sy;
        }

        // All landmarks on one point: fall back to a pure translation.
        let (a, b) = if den > f32::EPSILON { (num_a / den, num_b / den) } else { (1.0, 0.0) };

        Self {
            a,
            b,
            tx: dxm - (a * sxm - b * sym),
            ty: dym - (b * sxm + a * sym),
        }
    }

    /// Map a destination point back into source coordinates.
    fn invert_point(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        let det = self.a * self.a + self.b * self.b;
        if det < f32::EPSILON {
            return None;
        }
        let (dx, dy) = (x - self.tx, y - self.ty);
        Some(((self.a * dx + self.b * dy) / det, (self.a * dy - self.b * dx) / det))
    }
}

/// Bilinear RGB sample; outside the frame reads as black.
fn sample(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);

    let at = |px: i64, py: i64| -> [f32; 3] {
        if px < 0 || py < 0 || px >= frame.width as i64 || py >= frame.height as i64 {
            return [0.0; 3];
        }
        let p = frame.pixel(px as u32, py as u32);
        [p[0] as f32, p[1] as f32, p[2] as f32]
    };

    let (tl, tr, bl, br) = (at(x0, y0), at(x0 + 1, y0), at(x0, y0 + 1), at(x0 + 1, y0 + 1));
    std::array::from_fn(|c| {
        let top = tl[c] + (tr[c] - tl[c]) * fx;
        let bottom = bl[c] + (br[c] - bl[c]) * fx;
        top + (bottom - top) * fy
    })
}

/// Warp the face described by `landmarks` into a 112×112 RGB crop.
pub fn align_face(frame: &Frame, landmarks: &[(f32, f32); 5]) -> Vec<u8> {
    let transform = Similarity::fit(landmarks, &REFERENCE_LANDMARKS_112);
    let mut out = vec![0u8; ALIGNED_SIZE * ALIGNED_SIZE * 3];

    for oy in 0..ALIGNED_SIZE {
        for ox in 0..ALIGNED_SIZE {
            let Some((sx, sy)) = transform.invert_point(ox as f32, oy as f32) else {
                continue;
            };
            let rgb = sample(frame, sx, sy);
            let base = (oy * ALIGNED_SIZE + ox) * 3;
            for c in 0..3 {
                out[base + c] = rgb[c].round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    out
}
