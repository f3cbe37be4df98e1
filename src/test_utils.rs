//! Fixtures shared by the unit tests

use nalgebra::DMatrix;

use crate::{
    ccd::{Ccd, Frame, Window},
    raw::{CcdLayout, RunHeader, WindowLayout},
};

/// A 2x2 window at the detector origin, values given row by row
pub fn window(values: [f32; 4]) -> Window {
    Window::new(1, 1, 1, 1, DMatrix::from_row_slice(2, 2, &values))
}

/// A frame made of single-window 4x4 CCDs: `(label, pixels, is_data)`
pub fn frame(ccds: &[(&str, [f32; 4], bool)]) -> Frame {
    Frame::new(
        ccds.iter()
            .map(|&(label, values, is_data)| {
                let ccd = Ccd::new([("E1", window(values))].into_iter().collect(), 4, 4);
                (label, if is_data { ccd } else { ccd.blank() })
            })
            .collect(),
    )
}

/// A run header matching the frames built by [frame]
pub fn run_header(instrument: &str, labels: &[&str]) -> RunHeader {
    RunHeader {
        instrument: instrument.to_string(),
        ccds: labels
            .iter()
            .map(|label| CcdLayout {
                label: label.to_string(),
                nxtot: 4,
                nytot: 4,
                windows: vec![WindowLayout {
                    label: "E1".to_string(),
                    llx: 1,
                    lly: 1,
                    nx: 2,
                    ny: 2,
                    xbin: 1,
                    ybin: 1,
                }],
            })
            .collect(),
    }
}
