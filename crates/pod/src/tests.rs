use crate::{
    Choice, ChoiceType, Fraction, ObjectBuilder, Property, PropertyFlags, Rectangle, Value, filter,
    fixate,
};

const FORMAT: u32 = 3;
const RATE: u32 = 1;
const CHANNELS: u32 = 2;

#[test]
fn filter_without_filter_copies() {
    let pod = ObjectBuilder::new(FORMAT, FORMAT)
        .property(RATE, 48000i32)
        .build_value();

    let res = filter(&pod, None).unwrap();
    assert_eq!(res, pod);
}

#[test]
fn filter_equal_scalars() {
    let pod = ObjectBuilder::new(FORMAT, FORMAT)
        .property(RATE, 48000i32)
        .build_value();
    let f = ObjectBuilder::new(FORMAT, FORMAT)
        .property(RATE, 48000i32)
        .build_value();

    let res = filter(&pod, Some(&f)).unwrap();
    assert_eq!(res.as_object().unwrap().value(RATE), Some(&Value::Int(48000)));
}

#[test]
fn filter_unequal_scalars_fail() {
    let pod = ObjectBuilder::new(FORMAT, FORMAT)
        .property(RATE, 48000i32)
        .build_value();
    let f = ObjectBuilder::new(FORMAT, FORMAT)
        .property(RATE, 44100i32)
        .build_value();

    assert!(filter(&pod, Some(&f)).is_err());
}

#[test]
fn filter_enum_against_range() {
    // The literal negotiation scenario: an offer of {44100, 48000} against an
    // acceptable range of [40000, 46000] leaves exactly 44100.
    let pod = ObjectBuilder::new(FORMAT, FORMAT)
        .property_enum(RATE, 44100i32, [44100i32, 48000])
        .build_value();
    let f = ObjectBuilder::new(FORMAT, FORMAT)
        .property_range(RATE, 48000i32, 40000i32, 46000i32)
        .build_value();

    let res = filter(&pod, Some(&f)).unwrap();
    assert_eq!(res.as_object().unwrap().value(RATE), Some(&Value::Int(44100)));
}

#[test]
fn filter_enum_against_enum_prefers_filter_order() {
    let pod = ObjectBuilder::new(FORMAT, FORMAT)
        .property_enum(RATE, 44100i32, [44100i32, 48000, 96000])
        .build_value();
    let f = ObjectBuilder::new(FORMAT, FORMAT)
        .property_enum(RATE, 96000i32, [96000i32, 48000])
        .build_value();

    let res = filter(&pod, Some(&f)).unwrap();
    let value = res.as_object().unwrap().value(RATE).unwrap();
    let choice = value.as_choice().unwrap();
    assert_eq!(choice.ty, ChoiceType::ENUM);
    assert_eq!(choice.default_value(), Some(&Value::Int(96000)));
}

#[test]
fn filter_range_against_range() {
    let pod = ObjectBuilder::new(FORMAT, FORMAT)
        .property_range(RATE, 48000i32, 8000i32, 96000i32)
        .build_value();
    let f = ObjectBuilder::new(FORMAT, FORMAT)
        .property_range(RATE, 44100i32, 22050i32, 192000i32)
        .build_value();

    let res = filter(&pod, Some(&f)).unwrap();
    let value = res.as_object().unwrap().value(RATE).unwrap();
    let choice = value.as_choice().unwrap();
    assert_eq!(choice.ty, ChoiceType::RANGE);
    // Max of mins, min of maxes, default preferring the filter side.
    assert_eq!(choice.default_value(), Some(&Value::Int(44100)));
    assert_eq!(choice.min(), Some(&Value::Int(22050)));
    assert_eq!(choice.max(), Some(&Value::Int(96000)));
}

#[test]
fn filter_disjoint_ranges_fail() {
    let pod = ObjectBuilder::new(FORMAT, FORMAT)
        .property_range(RATE, 8000i32, 8000i32, 16000i32)
        .build_value();
    let f = ObjectBuilder::new(FORMAT, FORMAT)
        .property_range(RATE, 48000i32, 44100i32, 96000i32)
        .build_value();

    assert!(filter(&pod, Some(&f)).is_err());
}

#[test]
fn filter_flags_bitwise_and() {
    let pod = ObjectBuilder::new(FORMAT, FORMAT)
        .property_choice_flags(CHANNELS, 0b0111i32)
        .build_value();
    let f = ObjectBuilder::new(FORMAT, FORMAT)
        .property_choice_flags(CHANNELS, 0b0110i32)
        .build_value();

    let res = filter(&pod, Some(&f)).unwrap();
    let value = res.as_object().unwrap().value(CHANNELS).unwrap();
    let choice = value.as_choice().unwrap();
    assert_eq!(choice.ty, ChoiceType::FLAGS);
    assert_eq!(choice.default_value(), Some(&Value::Int(0b0110)));
}

#[test]
fn filter_flags_against_range_not_supported() {
    let pod = ObjectBuilder::new(FORMAT, FORMAT)
        .property_choice_flags(CHANNELS, 0b0111i32)
        .build_value();
    let f = ObjectBuilder::new(FORMAT, FORMAT)
        .property_range(CHANNELS, 1i32, 1i32, 8i32)
        .build_value();

    let err = filter(&pod, Some(&f)).unwrap_err();
    assert!(err.is_not_supported());
}

#[test]
fn filter_swaps_invalid_second_operand() {
    // An inverted range on the filter side loses its preferred-operand role;
    // the offered enumeration still decides the shape, and since the range
    // holds no values at all the intersection comes up empty.
    let pod = ObjectBuilder::new(FORMAT, FORMAT)
        .property_enum(RATE, 48000i32, [44100i32, 48000])
        .build_value();
    let f = ObjectBuilder::new(FORMAT, FORMAT)
        .property_range(RATE, 48000i32, 96000i32, 8000i32)
        .build_value();

    assert!(filter(&pod, Some(&f)).is_err());
}

#[test]
fn filter_mandatory_without_peer_fails() {
    let mut obj = ObjectBuilder::new(FORMAT, FORMAT)
        .property(RATE, 48000i32)
        .build();
    obj.set(Property::with_flags(
        CHANNELS,
        PropertyFlags::MANDATORY,
        Value::Int(2),
    ));
    let pod = Value::from(obj);

    let f = ObjectBuilder::new(FORMAT, FORMAT)
        .property(RATE, 48000i32)
        .build_value();

    assert!(filter(&pod, Some(&f)).is_err());
}

#[test]
fn filter_unmatched_props_copy_through() {
    let pod = ObjectBuilder::new(FORMAT, FORMAT)
        .property(RATE, 48000i32)
        .property(CHANNELS, 2i32)
        .build_value();
    let f = ObjectBuilder::new(FORMAT, FORMAT)
        .property(RATE, 48000i32)
        .build_value();

    let res = filter(&pod, Some(&f)).unwrap();
    assert_eq!(res.as_object().unwrap().value(CHANNELS), Some(&Value::Int(2)));
}

#[test]
fn filter_result_is_inside_both() {
    // The containment law: every scalar of the output is a member of both
    // input choice sets.
    let pod = ObjectBuilder::new(FORMAT, FORMAT)
        .property_enum(RATE, 44100i32, [8000i32, 44100, 48000, 96000])
        .build_value();
    let f = ObjectBuilder::new(FORMAT, FORMAT)
        .property_range(RATE, 48000i32, 16000i32, 48000i32)
        .build_value();

    let res = filter(&pod, Some(&f)).unwrap();
    let value = res.as_object().unwrap().value(RATE).unwrap();
    let (values, _) = value.choice_values();

    for v in values {
        let n = v.as_int().unwrap();
        assert!([8000, 44100, 48000, 96000].contains(&n));
        assert!((16000..=48000).contains(&n));
    }
}

#[test]
fn filter_fractions_and_rectangles() {
    let pod = ObjectBuilder::new(FORMAT, FORMAT)
        .property_range(
            RATE,
            Fraction::new(30, 1),
            Fraction::new(1, 1),
            Fraction::new(60, 1),
        )
        .property(CHANNELS, Rectangle::new(1920, 1080))
        .build_value();
    let f = ObjectBuilder::new(FORMAT, FORMAT)
        .property(RATE, Fraction::new(25, 1))
        .build_value();

    let res = filter(&pod, Some(&f)).unwrap();
    let obj = res.as_object().unwrap();
    assert_eq!(obj.value(RATE), Some(&Value::Fraction(Fraction::new(25, 1))));
    assert_eq!(
        obj.value(CHANNELS),
        Some(&Value::Rectangle(Rectangle::new(1920, 1080)))
    );
}

#[test]
fn filter_structs_recurse() {
    let pod = Value::Struct(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    let f = Value::Struct(vec![Value::Int(1), Value::Int(2)]);

    let res = filter(&pod, Some(&f)).unwrap();
    assert_eq!(res, pod);

    let bad = Value::Struct(vec![Value::Int(9)]);
    assert!(filter(&pod, Some(&bad)).is_err());
}

#[test]
fn fixate_collapses_choices() {
    let mut pod = ObjectBuilder::new(FORMAT, FORMAT)
        .property_enum(RATE, 48000i32, [44100i32, 48000])
        .property(CHANNELS, 2i32)
        .build_value();

    let count = fixate(&mut pod).unwrap();
    assert_eq!(count, 1);
    assert_eq!(pod.as_object().unwrap().value(RATE), Some(&Value::Int(48000)));
}

#[test]
fn fixate_honors_dont_fixate() {
    let mut obj = ObjectBuilder::new(FORMAT, FORMAT).build();
    obj.set(Property::with_flags(
        RATE,
        PropertyFlags::DONT_FIXATE,
        Value::from(Choice::new(
            ChoiceType::ENUM,
            vec![Value::Int(48000), Value::Int(44100)],
        )),
    ));
    let mut pod = Value::from(obj);

    assert_eq!(fixate(&mut pod).unwrap(), 0);
    assert!(pod.as_object().unwrap().value(RATE).unwrap().as_choice().is_some());
}

#[test]
fn choice_validity() {
    let ok = Choice::new(
        ChoiceType::RANGE,
        vec![Value::Int(5), Value::Int(0), Value::Int(10)],
    );
    assert!(ok.is_valid());

    let inverted = Choice::new(
        ChoiceType::RANGE,
        vec![Value::Int(5), Value::Int(10), Value::Int(0)],
    );
    assert!(!inverted.is_valid());

    let empty = Choice::new(ChoiceType::ENUM, vec![]);
    assert!(!empty.is_valid());
}

#[test]
fn value_ranges_with_step() {
    let v = Value::Int(8);
    assert!(v.is_in_range(&Value::Int(0), &Value::Int(16), Some(&Value::Int(4))));
    assert!(!Value::Int(9).is_in_range(&Value::Int(0), &Value::Int(16), Some(&Value::Int(4))));
}
