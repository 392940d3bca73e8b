//! Map camera derived from the visible marker set.

use serde::Serialize;

use crate::models::snapshot::SensorView;

/// Where the map opens when there is nothing to show.
pub const DEFAULT_CENTER: LatLng = LatLng {
    lat: 43.2567,
    lng: 76.9286,
};
pub const DEFAULT_ZOOM: u8 = 11;
/// Fraction of the bounds' span added on every side.
pub const BOUNDS_PADDING: f64 = 0.2;
/// Degenerate spans (one marker, or markers on a line) are widened to this
/// many degrees before padding so the padding is never zero.
pub const MIN_SPAN_DEG: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    /// Smallest box holding every point, or `None` for no points.
    pub fn enclosing<I: IntoIterator<Item = LatLng>>(points: I) -> Option<Self> {
        points.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => Bounds {
                    south: p.lat,
                    west: p.lng,
                    north: p.lat,
                    east: p.lng,
                },
                Some(b) => Bounds {
                    south: b.south.min(p.lat),
                    west: b.west.min(p.lng),
                    north: b.north.max(p.lat),
                    east: b.east.max(p.lng),
                },
            })
        })
    }

    pub fn center(&self) -> LatLng {
        LatLng {
            lat: (self.south + self.north) / 2.0,
            lng: (self.west + self.east) / 2.0,
        }
    }

    pub fn contains(&self, p: LatLng) -> bool {
        p.lat >= self.south && p.lat <= self.north && p.lng >= self.west && p.lng <= self.east
    }

    /// Grow by `ratio` of the current span on each side.
    pub fn pad(&self, ratio: f64) -> Bounds {
        let lat_buf = (self.north - self.south) * ratio;
        let lng_buf = (self.east - self.west) * ratio;
        Bounds {
            south: self.south - lat_buf,
            west: self.west - lng_buf,
            north: self.north + lat_buf,
            east: self.east + lng_buf,
        }
    }

    fn with_min_span(&self, min: f64) -> Bounds {
        let c = self.center();
        let half_lat = ((self.north - self.south) / 2.0).max(min / 2.0);
        let half_lng = ((self.east - self.west) / 2.0).max(min / 2.0);
        Bounds {
            south: c.lat - half_lat,
            west: c.lng - half_lng,
            north: c.lat + half_lat,
            east: c.lng + half_lng,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Viewport {
    Centered { center: LatLng, zoom: u8 },
    Fit { bounds: Bounds },
}

impl Viewport {
    pub fn default_region() -> Self {
        Viewport::Centered {
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
        }
    }

    pub fn center(&self) -> LatLng {
        match self {
            Viewport::Centered { center, .. } => *center,
            Viewport::Fit { bounds } => bounds.center(),
        }
    }
}

pub trait Located {
    fn position(&self) -> LatLng;
}

impl Located for LatLng {
    fn position(&self) -> LatLng {
        *self
    }
}

impl Located for SensorView {
    fn position(&self) -> LatLng {
        LatLng {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

/// Fit the camera to `markers`: the default region when empty, otherwise
/// the enclosing bounds padded by `BOUNDS_PADDING`.
pub fn fit<M: Located>(markers: &[M]) -> Viewport {
    match Bounds::enclosing(markers.iter().map(Located::position)) {
        None => Viewport::default_region(),
        Some(b) => Viewport::Fit {
            bounds: b.with_min_span(MIN_SPAN_DEG).pad(BOUNDS_PADDING),
        },
    }
}

/// The rendered marker set and the camera fitted to it. The camera is
/// recomputed in full every time the set is replaced.
#[derive(Debug, Clone)]
pub struct MapView {
    markers: Vec<SensorView>,
    viewport: Viewport,
}

impl Default for MapView {
    fn default() -> Self {
        MapView {
            markers: Vec::new(),
            viewport: Viewport::default_region(),
        }
    }
}

impl MapView {
    pub fn set_markers(&mut self, markers: Vec<SensorView>) -> Viewport {
        self.viewport = fit(&markers);
        self.markers = markers;
        self.viewport
    }

    pub fn markers(&self) -> &[SensorView] {
        &self.markers
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }
}
