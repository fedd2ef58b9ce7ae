//! Crossing the script boundary: pixels go in as `#{r, g, b, a}` maps of
//! ints and must come back in the same shape.
//!
//! Channel narrowing wraps: only the low 8 bits of the integer survive, so
//! `300` becomes `44` and `-1` becomes `255`. Floats are truncated toward
//! zero first.
use rhai::{Dynamic, Map, INT};

use crate::grid::Rgba;

const CHANNELS: [&str; 4] = ["r", "g", "b", "a"];

pub fn narrow_channel(value: i64) -> u8 {
    value as u8
}

pub(crate) fn pixel_to_map(pixel: Rgba) -> Map {
    let mut map = Map::new();
    for (key, value) in CHANNELS.iter().zip(pixel.to_array()) {
        map.insert((*key).into(), Dynamic::from(value as INT));
    }
    map
}

/// Every mismatch becomes a reason string; the caller attaches the pixel.
pub(crate) fn map_to_pixel(value: Dynamic) -> Result<Rgba, String> {
    let type_name = value.type_name();
    let Some(map) = value.try_cast::<Map>() else {
        return Err(format!("expected a map with r, g, b, a; got {type_name}"));
    };

    let mut channels = [0u8; 4];
    for (slot, key) in channels.iter_mut().zip(CHANNELS) {
        let value = map
            .get(key)
            .ok_or_else(|| format!("missing channel '{key}'"))?;
        *slot = coerce_channel(key, value)?;
    }
    let [r, g, b, a] = channels;
    Ok(Rgba::new(r, g, b, a))
}

fn coerce_channel(key: &str, value: &Dynamic) -> Result<u8, String> {
    if let Ok(int) = value.as_int() {
        return Ok(narrow_channel(int));
    }
    if let Ok(float) = value.as_float() {
        if !float.is_finite() {
            return Err(format!("channel '{key}' is not a finite number ({float})"));
        }
        // reduce before casting so floats beyond i64 still wrap
        return Ok(float.trunc().rem_euclid(256.0) as u8);
    }
    Err(format!(
        "channel '{key}' is {}, expected a number",
        value.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_map(r: Dynamic, g: Dynamic, b: Dynamic, a: Dynamic) -> Dynamic {
        let mut map = Map::new();
        map.insert("r".into(), r);
        map.insert("g".into(), g);
        map.insert("b".into(), b);
        map.insert("a".into(), a);
        Dynamic::from(map)
    }

    #[test]
    fn wraps_to_low_eight_bits() {
        assert_eq!(narrow_channel(300), 44);
        assert_eq!(narrow_channel(256), 0);
        assert_eq!(narrow_channel(255), 255);
        assert_eq!(narrow_channel(-1), 255);
        assert_eq!(narrow_channel(-256), 0);
    }

    #[test]
    fn narrowing_is_uniform_across_channels() {
        for value in 0..512i64 {
            let expected = (value % 256) as u8;
            for channel in 0..4 {
                let mut parts: Vec<Dynamic> = (0..4).map(|_| Dynamic::from(0 as INT)).collect();
                parts[channel] = Dynamic::from(value as INT);
                let [r, g, b, a]: [Dynamic; 4] = parts.try_into().unwrap();
                let pixel = map_to_pixel(channel_map(r, g, b, a)).unwrap();
                assert_eq!(pixel.to_array()[channel], expected, "value {value} channel {channel}");
            }
        }
    }

    #[test]
    fn floats_truncate_toward_zero() {
        let pixel = map_to_pixel(channel_map(
            Dynamic::from(12.9 as rhai::FLOAT),
            Dynamic::from(-0.5 as rhai::FLOAT),
            Dynamic::from(300.2 as rhai::FLOAT),
            Dynamic::from(255 as INT),
        ))
        .unwrap();
        assert_eq!(pixel, Rgba::new(12, 0, 44, 255));
    }

    #[test]
    fn large_and_negative_floats_wrap_like_ints() {
        let pixel = map_to_pixel(channel_map(
            Dynamic::from(1e19 as rhai::FLOAT),
            Dynamic::from(-1.0 as rhai::FLOAT),
            Dynamic::from(-3.7 as rhai::FLOAT),
            Dynamic::from(1e300 as rhai::FLOAT),
        ))
        .unwrap();
        assert_eq!(pixel, Rgba::new(0, 255, 253, 0));
    }

    #[test]
    fn rejects_wrong_shapes() {
        assert!(map_to_pixel(Dynamic::from(5 as INT))
            .unwrap_err()
            .contains("expected a map"));
        assert!(map_to_pixel(Dynamic::UNIT).is_err());

        let mut partial = Map::new();
        partial.insert("r".into(), Dynamic::from(1 as INT));
        assert_eq!(
            map_to_pixel(Dynamic::from(partial)).unwrap_err(),
            "missing channel 'g'"
        );

        let text = channel_map(
            Dynamic::from("red".to_string()),
            Dynamic::from(0 as INT),
            Dynamic::from(0 as INT),
            Dynamic::from(0 as INT),
        );
        assert!(map_to_pixel(text).unwrap_err().contains("channel 'r'"));
    }

    #[test]
    fn round_trips_through_map() {
        let pixel = Rgba::new(1, 2, 3, 4);
        assert_eq!(map_to_pixel(Dynamic::from(pixel_to_map(pixel))).unwrap(), pixel);
    }
}
