//! Structural intersection of values.
//!
//! Filtering takes a value describing what one side can produce and a value
//! describing what the other side will accept, and computes a value that
//! satisfies both. Choices are narrowed: enumerations intersect, ranges clamp,
//! flags combine bitwise. The result is structurally inside both operands.

use core::cmp::Ordering;

use crate::error::ErrorKind;
use crate::{Choice, ChoiceType, Error, Object, Property, Value};

/// Intersect `pod` with an optional filter.
///
/// Without a filter the pod is returned unchanged. An empty intersection
/// fails.
///
/// # Examples
///
/// ```
/// use pod::{ObjectBuilder, Value, filter};
///
/// let offer = ObjectBuilder::new(3, 3)
///     .property_enum(1, 44100i32, [44100i32, 48000])
///     .build_value();
/// let accept = ObjectBuilder::new(3, 3)
///     .property_range(1, 48000i32, 40000i32, 46000i32)
///     .build_value();
///
/// let res = filter(&offer, Some(&accept))?;
/// let obj = res.as_object().unwrap();
/// assert_eq!(obj.value(1), Some(&Value::Int(44100)));
/// # Ok::<_, pod::Error>(())
/// ```
pub fn filter(pod: &Value, filter: Option<&Value>) -> Result<Value, Error> {
    let Some(f) = filter else {
        return Ok(pod.clone());
    };

    filter_part(pod, f)
}

fn filter_part(pod: &Value, filter: &Value) -> Result<Value, Error> {
    match (pod, filter) {
        (Value::Object(op), Value::Object(of)) => {
            Ok(Value::from(filter_object(op, of)?))
        }
        (Value::Struct(sp), Value::Struct(sf)) => {
            let mut fields = Vec::with_capacity(sp.len());

            for (i, p) in sp.iter().enumerate() {
                match sf.get(i) {
                    Some(f) => fields.push(filter_part(p, f)?),
                    // Filter exhausted, the rest copies through.
                    None => fields.push(p.clone()),
                }
            }

            Ok(Value::Struct(fields))
        }
        (p, f) if p.ty() == f.ty() => {
            if p == f {
                Ok(p.clone())
            } else {
                Err(Error::new(ErrorKind::Invalid))
            }
        }
        (p, f) => Err(Error::new(ErrorKind::TypeMismatch(p.ty(), f.ty()))),
    }
}

fn filter_object(pod: &Object, filter: &Object) -> Result<Object, Error> {
    let mut out = Object::new(pod.object_type, pod.object_id);

    for p1 in &pod.properties {
        match filter.find(p1.key) {
            Some(p2) => {
                out.properties.push(filter_prop(p1, p2)?);
            }
            None if p1.flags.contains(crate::PropertyFlags::MANDATORY) => {
                return Err(Error::new(ErrorKind::Invalid));
            }
            None if !p1.flags.contains(crate::PropertyFlags::DROP) => {
                out.properties.push(p1.clone());
            }
            None => {}
        }
    }

    for p2 in &filter.properties {
        if pod.find(p2.key).is_some() {
            continue;
        }

        if p2.flags.contains(crate::PropertyFlags::MANDATORY) {
            return Err(Error::new(ErrorKind::Invalid));
        }

        if !p2.flags.contains(crate::PropertyFlags::DROP) {
            out.properties.push(p2.clone());
        }
    }

    Ok(out)
}

/// Intersect a single property pair.
fn filter_prop(p1: &Property, p2: &Property) -> Result<Property, Error> {
    let (mut alt1, mut c1) = p1.value.choice_values();
    let (mut alt2, mut c2) = p2.value.choice_values();

    if alt1.is_empty() || alt2.is_empty() {
        return Err(Error::new(ErrorKind::Invalid));
    }

    let ty = alt1[0].ty();

    if alt2[0].ty() != ty {
        return Err(Error::new(ErrorKind::TypeMismatch(ty, alt2[0].ty())));
    }

    let flags = p1.flags & p2.flags;

    // The second operand's values are preferred, but only while they describe
    // a well-formed choice. Swap the operands otherwise.
    if !is_valid_choice(alt2, c2) {
        core::mem::swap(&mut alt1, &mut alt2);
        core::mem::swap(&mut c1, &mut c2);
    }

    let value = match (kind(c1), kind(c2)) {
        (Kind::List, Kind::List) => {
            let mut matches = Vec::new();

            // Iterate the second operand first so its preference order wins.
            for a2 in alt2 {
                for a1 in alt1 {
                    if a1.compare(a2) == Some(Ordering::Equal) {
                        matches.push(a1.clone());
                    }
                }
            }

            collapse(matches)?
        }
        (Kind::List, Kind::Range) => {
            let (min, max, step) = range_of(alt2, c2);
            let mut values = Vec::new();
            let mut found_def = false;

            // Prefer the range default, when it is valid and offered.
            if alt2[0].is_in_range(min, max, None)
                && let Some(def) = alt1
                    .iter()
                    .find(|a1| a1.compare(&alt2[0]) == Some(Ordering::Equal))
            {
                values.push(def.clone());
                found_def = true;
            }

            let mut n_copied = 0;

            for a1 in alt1 {
                if !a1.is_in_range(min, max, step) {
                    continue;
                }

                if n_copied == 0 && !found_def {
                    values.push(a1.clone());
                }

                values.push(a1.clone());
                n_copied += 1;
            }

            if n_copied == 0 {
                return Err(Error::new(ErrorKind::Invalid));
            }

            if n_copied == 1 {
                values.pop();
            }

            collapse(values)?
        }
        (Kind::Range, Kind::List) => {
            let (min, max, step) = range_of(alt1, c1);
            let mut values = Vec::new();

            for a2 in alt2 {
                if !a2.is_in_range(min, max, step) {
                    continue;
                }

                if values.is_empty() {
                    values.push(a2.clone());
                }

                values.push(a2.clone());
            }

            if values.is_empty() {
                return Err(Error::new(ErrorKind::Invalid));
            }

            if values.len() == 2 {
                values.pop();
            }

            collapse(values)?
        }
        (Kind::Range, Kind::Range) => {
            let (min1, max1, _) = range_of(alt1, c1);
            let (min2, max2, _) = range_of(alt2, c2);

            // Max of mins, min of maxes.
            let min = if min1.compare(min2) == Some(Ordering::Less) {
                min2
            } else {
                min1
            };
            let max = if max2.compare(max1) == Some(Ordering::Less) {
                max2
            } else {
                max1
            };

            if max.compare(min) == Some(Ordering::Less) {
                return Err(Error::new(ErrorKind::Invalid));
            }

            // Prefer the second operand's default, fall back to the first,
            // then to the new minimum.
            let def = if alt2[0].is_in_range(min, max, None) {
                &alt2[0]
            } else if alt1[0].is_in_range(min, max, None) {
                &alt1[0]
            } else {
                min
            };

            Value::from(Choice::new(
                ChoiceType::RANGE,
                vec![def.clone(), min.clone(), max.clone()],
            ))
        }
        (Kind::Flags, Kind::Flags) | (Kind::Flags, Kind::List) | (Kind::List, Kind::Flags) => {
            let anded = match (&alt1[0], &alt2[0]) {
                (Value::Int(a), Value::Int(b)) => {
                    let v = a & b;
                    if v == 0 {
                        return Err(Error::new(ErrorKind::Invalid));
                    }
                    Value::Int(v)
                }
                (Value::Long(a), Value::Long(b)) => {
                    let v = a & b;
                    if v == 0 {
                        return Err(Error::new(ErrorKind::Invalid));
                    }
                    Value::Long(v)
                }
                _ => return Err(Error::new(ErrorKind::NotSupported)),
            };

            Value::from(Choice::new(ChoiceType::FLAGS, vec![anded]))
        }
        _ => return Err(Error::new(ErrorKind::NotSupported)),
    };

    Ok(Property::with_flags(p1.key, flags, value))
}

/// Collapse the classic choice behavior of a filtered value list: a single
/// survivor becomes a plain value, anything more an enumeration whose first
/// entry doubles as the default.
fn collapse(values: Vec<Value>) -> Result<Value, Error> {
    match values.len() {
        0 => Err(Error::new(ErrorKind::Invalid)),
        1 => Ok(values.into_iter().next().unwrap()),
        // The default doubles as an alternative, so a list where every entry
        // is the same value holds exactly one option.
        _ if values.iter().all(|v| *v == values[0]) => {
            Ok(values.into_iter().next().unwrap())
        }
        _ => Ok(Value::from(Choice::new(ChoiceType::ENUM, values))),
    }
}

#[derive(PartialEq)]
enum Kind {
    List,
    Range,
    Flags,
}

fn kind(ty: ChoiceType) -> Kind {
    match ty {
        ChoiceType::RANGE | ChoiceType::STEP => Kind::Range,
        ChoiceType::FLAGS => Kind::Flags,
        _ => Kind::List,
    }
}

fn range_of(alt: &[Value], ty: ChoiceType) -> (&Value, &Value, Option<&Value>) {
    let min = alt.get(1).unwrap_or(&alt[0]);
    let max = alt.get(2).unwrap_or(&alt[0]);
    let step = if ty == ChoiceType::STEP {
        alt.get(3)
    } else {
        None
    };

    (min, max, step)
}

fn is_valid_choice(alt: &[Value], ty: ChoiceType) -> bool {
    match kind(ty) {
        Kind::Range => {
            let (min, max, _) = range_of(alt, ty);
            matches!(
                min.compare(max),
                Some(Ordering::Less | Ordering::Equal)
            )
        }
        _ => !alt.is_empty(),
    }
}

/// Collapse every choice of an object to its default so the object describes
/// exactly one configuration.
///
/// Properties flagged `DONT_FIXATE` are skipped, as are malformed choices.
/// Returns the number of collapsed properties.
pub fn fixate(value: &mut Value) -> Result<usize, Error> {
    let Value::Object(obj) = value else {
        return Err(Error::new(ErrorKind::Invalid));
    };

    let mut count = 0;

    for p in &mut obj.properties {
        let Value::Choice(c) = &p.value else {
            continue;
        };

        if p.flags.contains(crate::PropertyFlags::DONT_FIXATE) || !c.is_valid() {
            continue;
        }

        if let Some(def) = c.default_value() {
            p.value = def.clone();
            count += 1;
        }
    }

    Ok(count)
}
