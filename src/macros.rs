/// Logs a diagnostic message to the `statsum` log target.
///
/// The library never installs a logger; applications that want to see what
/// the client is doing configure one for the `statsum` target.
#[macro_export]
#[doc(hidden)]
macro_rules! statsum_debug {
    ($($arg:tt)*) => {
        ::log::debug!(target: "statsum", $($arg)*)
    };
}

/// Like `statsum_debug!` but at warning level, used for dropped data.
#[macro_export]
#[doc(hidden)]
macro_rules! statsum_warn {
    ($($arg:tt)*) => {
        ::log::warn!(target: "statsum", $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn statsum_debug_accepts_format_args() {
        let name = "my.counter";
        crate::statsum_debug!("merged {} into {}", 1, name);
        crate::statsum_warn!("dropped {name}");
    }
}

