use cfg_aliases::cfg_aliases;

fn main() {
    // Setup cfg aliases
    cfg_aliases! {
        // Platforms
        linux: {
            any(
                target_os = "linux",
                target_os = "dragonfly",
                target_os = "freebsd",
                target_os = "netbsd",
                target_os = "openbsd"
            )
        },
        android: { target_os = "android" },

        // Backends
        pipe_backend: { any(linux, android) },

        // dependencies
        serde: { feature = "serde" },
    }
}
