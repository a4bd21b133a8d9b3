//! Closed-form UTM <-> geographic conversion on the WGS84 ellipsoid,
//! following the Karney/Snyder series expansions used by the common UTM
//! conversion libraries.

use crate::error::{Error, Result};

const K0: f64 = 0.9996;
const R: f64 = 6_378_137.0;

const E: f64 = 0.006_694_38;
const E2: f64 = E * E;
const E3: f64 = E2 * E;
const E_P2: f64 = E / (1.0 - E);

const M1: f64 = 1.0 - E / 4.0 - 3.0 * E2 / 64.0 - 5.0 * E3 / 256.0;
const M2: f64 = 3.0 * E / 8.0 + 3.0 * E2 / 32.0 + 45.0 * E3 / 1024.0;
const M3: f64 = 15.0 * E2 / 256.0 + 45.0 * E3 / 1024.0;
const M4: f64 = 35.0 * E3 / 3072.0;

const ZONE_LETTERS: &[u8] = b"CDEFGHJKLMNPQRSTUVWXX";

/// A UTM position produced by [`from_latlon`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtmCoordinate {
    pub easting: f64,
    pub northing: f64,
    pub zone_number: u8,
    pub zone_letter: char,
}

/// Latitude band letter, for latitudes within the UTM domain [-80, 84].
pub fn zone_letter(latitude: f64) -> Option<char> {
    if (-80.0..=84.0).contains(&latitude) {
        Some(ZONE_LETTERS[((latitude + 80.0) as usize) >> 3] as char)
    } else {
        None
    }
}

/// UTM zone number, honouring the Norway and Svalbard exceptions.
pub fn zone_number(latitude: f64, longitude: f64) -> u8 {
    if (56.0..64.0).contains(&latitude) && (3.0..12.0).contains(&longitude) {
        return 32;
    }
    if (72.0..=84.0).contains(&latitude) && longitude >= 0.0 {
        if longitude < 9.0 {
            return 31;
        } else if longitude < 21.0 {
            return 33;
        } else if longitude < 33.0 {
            return 35;
        } else if longitude < 42.0 {
            return 37;
        }
    }
    (((longitude + 180.0) / 6.0) as u16 % 60 + 1) as u8
}

fn central_longitude(zone: u8) -> f64 {
    (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0
}

/// Project geographic coordinates into UTM.
pub fn from_latlon(latitude: f64, longitude: f64) -> Result<UtmCoordinate> {
    if !(-80.0..=84.0).contains(&latitude) {
        return Err(Error::data(format!(
            "latitude {latitude} outside the UTM domain [-80, 84]"
        )));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(Error::data(format!(
            "longitude {longitude} outside [-180, 180]"
        )));
    }
    let zone = zone_number(latitude, longitude);
    let letter = zone_letter(latitude).expect("latitude validated above");

    let lat_rad = latitude.to_radians();
    let lat_sin = lat_rad.sin();
    let lat_cos = lat_rad.cos();
    let lat_tan = lat_rad.tan();
    let t = lat_tan * lat_tan;

    let lon_rad = longitude.to_radians();
    let central = central_longitude(zone).to_radians();

    let n = R / (1.0 - E * lat_sin * lat_sin).sqrt();
    let c = E_P2 * lat_cos * lat_cos;
    let a = lat_cos * (lon_rad - central);
    let a2 = a * a;
    let a3 = a2 * a;
    let a4 = a3 * a;
    let a5 = a4 * a;
    let a6 = a5 * a;

    let m = R
        * (M1 * lat_rad - M2 * (2.0 * lat_rad).sin() + M3 * (4.0 * lat_rad).sin()
            - M4 * (6.0 * lat_rad).sin());

    let easting = K0
        * n
        * (a + a3 / 6.0 * (1.0 - t + c)
            + a5 / 120.0 * (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_P2))
        + 500_000.0;
    let mut northing = K0
        * (m + n
            * lat_tan
            * (a2 / 2.0
                + a4 / 24.0 * (5.0 - t + 9.0 * c + 4.0 * c * c)
                + a6 / 720.0 * (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_P2)));
    if latitude < 0.0 {
        northing += 10_000_000.0;
    }
    Ok(UtmCoordinate {
        easting,
        northing,
        zone_number: zone,
        zone_letter: letter,
    })
}

/// Invert a UTM position back to geographic coordinates.
pub fn to_latlon(
    easting: f64,
    northing: f64,
    zone_number: u8,
    northern: bool,
) -> Result<(f64, f64)> {
    if !(100_000.0..1_000_000.0).contains(&easting) {
        return Err(Error::data(format!(
            "easting {easting} outside [100000, 1000000)"
        )));
    }
    if !(0.0..=10_000_000.0).contains(&northing) {
        return Err(Error::data(format!(
            "northing {northing} outside [0, 10000000]"
        )));
    }
    if !(1..=60).contains(&zone_number) {
        return Err(Error::data(format!("zone number {zone_number} outside [1, 60]")));
    }

    let sqrt_e = (1.0 - E).sqrt();
    let e_ = (1.0 - sqrt_e) / (1.0 + sqrt_e);
    let e2 = e_ * e_;
    let e3 = e2 * e_;
    let e4 = e3 * e_;
    let e5 = e4 * e_;
    let p2 = 3.0 / 2.0 * e_ - 27.0 / 32.0 * e3 + 269.0 / 512.0 * e5;
    let p3 = 21.0 / 16.0 * e2 - 55.0 / 32.0 * e4;
    let p4 = 151.0 / 96.0 * e3 - 417.0 / 128.0 * e5;
    let p5 = 1097.0 / 512.0 * e4;

    let x = easting - 500_000.0;
    let y = if northern {
        northing
    } else {
        northing - 10_000_000.0
    };

    let m = y / K0;
    let mu = m / (R * M1);
    let p_rad = mu
        + p2 * (2.0 * mu).sin()
        + p3 * (4.0 * mu).sin()
        + p4 * (6.0 * mu).sin()
        + p5 * (8.0 * mu).sin();

    let p_sin = p_rad.sin();
    let p_sin2 = p_sin * p_sin;
    let p_cos = p_rad.cos();
    let p_tan = p_rad.tan();
    let p_tan2 = p_tan * p_tan;
    let p_tan4 = p_tan2 * p_tan2;

    let ep_sin = 1.0 - E * p_sin2;
    let ep_sin_sqrt = ep_sin.sqrt();
    let n = R / ep_sin_sqrt;
    let r = (1.0 - E) / ep_sin;
    let c = E_P2 * p_cos * p_cos;
    let c2 = c * c;

    let d = x / (n * K0);
    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d3 * d;
    let d5 = d4 * d;
    let d6 = d5 * d;

    let latitude = p_rad
        - (p_tan / r)
            * (d2 / 2.0 - d4 / 24.0 * (5.0 + 3.0 * p_tan2 + 10.0 * c - 4.0 * c2 - 9.0 * E_P2)
                + d6 / 720.0
                    * (61.0 + 90.0 * p_tan2 + 298.0 * c + 45.0 * p_tan4
                        - 252.0 * E_P2
                        - 3.0 * c2));
    let longitude = (d - d3 / 6.0 * (1.0 + 2.0 * p_tan2 + c)
        + d5 / 120.0
            * (5.0 - 2.0 * c + 28.0 * p_tan2 - 3.0 * c2 + 8.0 * E_P2 + 24.0 * p_tan4))
        / p_cos;

    Ok((
        latitude.to_degrees(),
        longitude.to_degrees() + central_longitude(zone_number),
    ))
}

/// Whether a latitude band letter lies in the northern hemisphere.
pub fn is_northern(zone_letter: char) -> bool {
    zone_letter >= 'N'
}
