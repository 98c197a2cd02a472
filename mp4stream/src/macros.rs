//! Shorthands for building and returning [`Report`](crate::error::Report)s.

/// Wrap `$err` in a [`Report`](crate::error::Report), attaching each trailing expression as context.
#[macro_export]
macro_rules! report_attach {
    ($err:expr $(, $($context:expr),+)? $(,)?) => {
        $crate::error::Report::from($err) $($(.attach_printable($context))+)?
    };
}

/// Return early with `$err` wrapped by [`report_attach!`], converting it into the function's error type.
#[macro_export]
macro_rules! bail_attach {
    ($err:expr $(, $($context:expr),+)? $(,)?) => {
        return Err($crate::report_attach!($err $(, $($context),+)?))?
    };
}

/// [`bail_attach!`] unless `$cond` holds; the failed condition is recorded as the first context line.
#[macro_export]
macro_rules! ensure_attach {
    ($cond:expr, $err:expr $(, $($context:expr),+)? $(,)?) => {
        if !($cond) {
            $crate::bail_attach!($err, concat!("condition failed: ", stringify!($cond)) $(, $($context),+)?);
        }
    };
}
