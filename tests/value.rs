use moonlet::errors::RuntimeError;
use moonlet::runtime::{ddiv, dmod, parse_number, IntoValue, Number, Runtime, Value, Varargs};
use pretty_assertions::assert_eq;

#[test]
fn narrowing() {
    assert_eq!(Value::from(2.0), Value::Integer(2));
    assert_eq!(Value::from(-0.0), Value::Integer(0));
    assert!(matches!(Value::from(2.5), Value::Double(_)));
    assert!(matches!(Value::from(1e40), Value::Double(_)));
    assert!(matches!(Value::from(f64::NAN), Value::Double(_)));

    // i64 construction narrows when in i32 range
    assert_eq!(Value::from(7_i64), Value::Integer(7));
    assert!(matches!(
        Value::from(i32::MAX as i64 + 1),
        Value::Double(_)
    ));
}

#[test]
fn integer_overflow_promotes() {
    let rt = Runtime::new();

    let sum = Value::Integer(i32::MAX)
        .add(&Value::Integer(1), &rt)
        .unwrap();
    assert_eq!(sum, Value::Double(i32::MAX as f64 + 1.0));

    let product = Value::Integer(i32::MIN)
        .mul(&Value::Integer(2), &rt)
        .unwrap();
    assert!(matches!(product, Value::Double(_)));

    // in-range results stay integers
    let sum = Value::Integer(2).add(&Value::Integer(3), &rt).unwrap();
    assert_eq!(sum, Value::Integer(5));
}

#[test]
fn division_never_traps() {
    let rt = Runtime::new();

    assert_eq!(ddiv(1.0, 0.0), f64::INFINITY);
    assert_eq!(ddiv(-1.0, 0.0), f64::NEG_INFINITY);
    assert!(ddiv(0.0, 0.0).is_nan());

    let quotient = Value::Integer(1).div(&Value::Integer(0), &rt).unwrap();
    assert_eq!(quotient, Value::Double(f64::INFINITY));

    let quotient = Value::Integer(0).div(&Value::Integer(0), &rt).unwrap();
    assert!(matches!(quotient, Value::Double(d) if d.is_nan()));
}

#[test]
fn floored_modulo() {
    let rt = Runtime::new();

    assert_eq!(dmod(5.0, 3.0), 2.0);
    assert_eq!(dmod(5.0, -3.0), -1.0);
    assert_eq!(dmod(-5.0, 3.0), 1.0);
    assert!(dmod(1.0, 0.0).is_nan());

    let result = Value::Integer(5).modulo(&Value::Integer(-3), &rt).unwrap();
    assert_eq!(result, Value::Integer(-1));
}

#[test]
fn string_operands_coerce() {
    let rt = Runtime::new();

    let ten: Value = "10".into_value(&rt).unwrap();
    assert_eq!(ten.add(&Value::Integer(5), &rt).unwrap(), Value::Integer(15));

    let float: Value = "0x10".into_value(&rt).unwrap();
    assert_eq!(float.to_integer(), Some(16));

    let junk: Value = "10 apples".into_value(&rt).unwrap();
    let err = junk.add(&Value::Integer(5), &rt).unwrap_err();
    assert_eq!(err, RuntimeError::InvalidArithmetic("string"));
}

#[test]
fn number_parsing() {
    assert_eq!(parse_number("42"), Some(Number::Integer(42)));
    assert_eq!(parse_number("  -42  "), Some(Number::Integer(-42)));
    assert_eq!(parse_number("0xFF"), Some(Number::Integer(255)));
    assert_eq!(parse_number("-0x10"), Some(Number::Integer(-16)));
    assert_eq!(parse_number("1e3"), Some(Number::Integer(1000)));
    assert_eq!(parse_number("0.5"), Some(Number::Double(0.5)));
    assert_eq!(parse_number("2.0"), Some(Number::Integer(2)));

    // long hex literals wrap instead of failing
    assert_eq!(
        parse_number("0xFFFFFFFFFFFFFFFF"),
        Some(Number::Integer(-1))
    );
    assert!(matches!(
        parse_number("0x7FFFFFFFFFFFFFFF"),
        Some(Number::Double(_))
    ));
    assert_eq!(parse_number("0x"), None);
    assert_eq!(parse_number("0xZZ"), None);
    assert_eq!(parse_number(""), None);
    assert_eq!(parse_number("bogus"), None);
    assert_eq!(parse_number("inf"), None);
    assert_eq!(parse_number("nan"), None);
}

#[test]
fn display_formatting() {
    assert_eq!(Value::Integer(3).to_string(), "3");
    assert_eq!(Value::Double(0.5).to_string(), "0.5");
    assert_eq!(Value::Double(f64::INFINITY).to_string(), "inf");
    assert_eq!(Value::Double(f64::NEG_INFINITY).to_string(), "-inf");
    assert_eq!(Value::Double(f64::NAN).to_string(), "nan");
    assert_eq!(Value::Nil.to_string(), "nil");
    assert_eq!(Value::Boolean(true).to_string(), "true");

    let rt = Runtime::new();
    let table = rt.create_table();
    assert!(Value::Table(table).to_string().starts_with("table: 0x"));
}

#[test]
fn comparisons() {
    let rt = Runtime::new();

    assert!(Value::Integer(1).lt(&Value::Double(1.5), &rt).unwrap());
    assert!(!Value::Double(2.0).lt(&Value::Integer(2), &rt).unwrap());
    assert!(Value::Integer(2).lteq(&Value::Integer(2), &rt).unwrap());

    let abc: Value = "abc".into_value(&rt).unwrap();
    let abd: Value = "abd".into_value(&rt).unwrap();
    assert!(abc.lt(&abd, &rt).unwrap());
    assert!(abc.lteq(&abc, &rt).unwrap());

    let err = Value::Integer(1).lt(&abc, &rt).unwrap_err();
    assert_eq!(err, RuntimeError::InvalidCompare("number", "string"));
    assert_eq!(err.to_string(), "attempt to compare number with string");
}

#[test]
fn raw_equality() {
    let rt = Runtime::new();

    assert_eq!(Value::Integer(2), Value::Double(2.0));
    assert!(!Value::Double(f64::NAN).raw_equals(&Value::Double(f64::NAN)));

    let a = rt.create_table();
    let b = rt.create_table();
    assert!(Value::Table(a.clone()).raw_equals(&Value::Table(a.clone())));
    assert!(!Value::Table(a).raw_equals(&Value::Table(b)));

    // interned and non-interned strings compare by bytes
    let short: Value = "hi".into_value(&rt).unwrap();
    let other: Value = "hi".into_value(&rt).unwrap();
    assert!(short.raw_equals(&other));
}

#[test]
fn eq_metamethod() {
    let rt = Runtime::new();

    let handler = rt.create_function(|_, _| Ok(Varargs::from(Value::Boolean(true))));
    let mt = rt.create_table();
    mt.raw_set("__eq", handler, &rt).unwrap();

    let a = rt.create_table();
    let b = rt.create_table();
    a.set_metatable(Some(&mt), &rt).unwrap();
    b.set_metatable(Some(&mt), &rt).unwrap();

    let a = Value::Table(a);
    let b = Value::Table(b);
    assert!(!a.raw_equals(&b));
    assert!(a.eq(&b, &rt).unwrap());

    // mismatched handlers never fire
    let c = rt.create_table();
    let other_mt = rt.create_table();
    let other_handler = rt.create_function(|_, _| Ok(Varargs::from(Value::Boolean(true))));
    other_mt.raw_set("__eq", other_handler, &rt).unwrap();
    c.set_metatable(Some(&other_mt), &rt).unwrap();
    assert!(!a.eq(&Value::Table(c), &rt).unwrap());

    // different categories never consult __eq
    assert!(!a.eq(&Value::Integer(1), &rt).unwrap());
}

#[test]
fn arithmetic_metamethods() {
    let rt = Runtime::new();

    let handler = rt.create_function(|args, rt| {
        // operands arrive in original order; the table may be on either side
        let addend = args
            .arg1()
            .to_integer()
            .or_else(|| args.arg(2).to_integer())
            .unwrap_or(0);
        Varargs::pack((100 + addend,), rt)
    });

    let mt = rt.create_table();
    mt.raw_set("__add", handler, &rt).unwrap();

    let t = rt.create_table();
    t.set_metatable(Some(&mt), &rt).unwrap();

    let t = Value::Table(t);
    assert_eq!(t.add(&Value::Integer(5), &rt).unwrap(), Value::Integer(105));
    // right operand handler fires too
    assert_eq!(Value::Integer(5).add(&t, &rt).unwrap(), Value::Integer(105));

    let bare = Value::Table(rt.create_table());
    let err = bare.add(&Value::Integer(1), &rt).unwrap_err();
    assert_eq!(err, RuntimeError::InvalidArithmetic("table"));
}

#[test]
fn unary_minus() {
    let rt = Runtime::new();

    assert_eq!(Value::Integer(5).neg(&rt).unwrap(), Value::Integer(-5));

    let two: Value = "2".into_value(&rt).unwrap();
    assert_eq!(two.neg(&rt).unwrap(), Value::Integer(-2));

    let err = Value::Table(rt.create_table()).neg(&rt).unwrap_err();
    assert_eq!(err, RuntimeError::InvalidArithmetic("table"));
}

#[test]
fn concatenation() {
    let rt = Runtime::new();

    let a: Value = "a".into_value(&rt).unwrap();
    let b: Value = "b".into_value(&rt).unwrap();
    let joined: Value = "ab".into_value(&rt).unwrap();
    assert_eq!(a.concat(&b, &rt).unwrap(), joined);

    let expected: Value = "a2".into_value(&rt).unwrap();
    assert_eq!(a.concat(&Value::Integer(2), &rt).unwrap(), expected);

    let expected: Value = "10.5".into_value(&rt).unwrap();
    assert_eq!(
        Value::Integer(1).concat(&Value::Double(0.5), &rt).unwrap(),
        expected
    );

    let err = a.concat(&Value::Nil, &rt).unwrap_err();
    assert_eq!(err, RuntimeError::InvalidConcat("nil"));

    let handler = rt.create_function(|_, rt| Varargs::pack(("joined",), rt));
    let mt = rt.create_table();
    mt.raw_set("__concat", handler, &rt).unwrap();
    let t = rt.create_table();
    t.set_metatable(Some(&mt), &rt).unwrap();

    let expected: Value = "joined".into_value(&rt).unwrap();
    assert_eq!(a.concat(&Value::Table(t), &rt).unwrap(), expected);
}

#[test]
fn short_strings_dedup() {
    let rt = Runtime::new();

    let a = rt.intern_string(b"hello");
    let b = rt.intern_string(b"hello");
    assert!(a.ptr_eq(&b));

    let long = b"this string is far too long for the short string cache";
    let a = rt.intern_string(long);
    let b = rt.intern_string(long);
    assert!(!a.ptr_eq(&b));
    assert_eq!(a, b);
}
