//! Property-based tests for core domain types.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

use proptest::prelude::*;

use git_remote_rclone::core::object::RawObject;
use git_remote_rclone::core::paths::RemoteLayout;
use git_remote_rclone::core::types::{HashKind, ObjectKind, Oid, RefName};
use git_remote_rclone::core::url::RemoteUrl;
use git_remote_rclone::protocol::Command;

/// Strategy for generating a single ref path component.
fn ref_component() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-][a-zA-Z0-9_.-]{0,15}".prop_filter("must not end with .lock", |c| {
        !c.ends_with(".lock") && !c.contains("..")
    })
}

/// Strategy for generating valid ref names under refs/heads or refs/tags.
fn valid_ref_name() -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec!["refs/heads", "refs/tags", "refs/notes"]),
        prop::collection::vec(ref_component(), 1..4),
    )
        .prop_map(|(namespace, parts)| format!("{namespace}/{}", parts.join("/")))
}

/// Strategy for generating valid hex OIDs of either hash width.
fn valid_oid_string() -> impl Strategy<Value = String> {
    prop_oneof!["[0-9a-f]{40}", "[0-9a-f]{64}"]
}

fn object_kind() -> impl Strategy<Value = ObjectKind> {
    prop::sample::select(vec![
        ObjectKind::Commit,
        ObjectKind::Tree,
        ObjectKind::Blob,
        ObjectKind::Tag,
    ])
}

proptest! {
    /// OIDs are normalized to lowercase.
    #[test]
    fn oid_normalized_to_lowercase(oid_str in valid_oid_string()) {
        let oid = Oid::new(oid_str.to_uppercase()).unwrap();
        prop_assert_eq!(oid.as_str(), oid_str.as_str());
    }

    /// Anything that is not 40 or 64 characters long is rejected.
    #[test]
    fn oid_rejects_wrong_length(oid_str in "[0-9a-f]{1,80}") {
        prop_assume!(oid_str.len() != 40 && oid_str.len() != 64);
        prop_assert!(Oid::new(oid_str).is_err());
    }

    /// A single non-hex character poisons an otherwise valid id.
    #[test]
    fn oid_rejects_non_hex(oid_str in "[0-9a-f]{40}", pos in 0usize..40, bad in "[g-zG-Z_ ]") {
        let mut chars: Vec<char> = oid_str.chars().collect();
        chars[pos] = bad.chars().next().unwrap();
        let poisoned: String = chars.into_iter().collect();
        prop_assert!(Oid::new(poisoned).is_err());
    }

    /// The hash kind follows the id width.
    #[test]
    fn oid_hash_kind_follows_width(oid_str in valid_oid_string()) {
        let oid = Oid::new(&oid_str).unwrap();
        prop_assert_eq!(oid.hash_kind().hex_len(), oid_str.len());
        prop_assert_eq!(Oid::from_raw(&oid.to_raw()).unwrap(), oid);
    }

    /// Generated ref names are accepted and keep their namespace.
    #[test]
    fn valid_ref_names_accepted(name in valid_ref_name()) {
        let refname = RefName::new(&name).unwrap();
        prop_assert_eq!(refname.as_str(), name.as_str());
        prop_assert_eq!(refname.is_branch_ref(), name.starts_with("refs/heads/"));
    }

    /// Ref names outside refs/ are rejected, whatever they look like.
    #[test]
    fn ref_names_outside_refs_rejected(name in "[a-zA-Z0-9_/.-]{1,40}") {
        prop_assume!(!name.starts_with("refs/"));
        prop_assert!(RefName::new(name).is_err());
    }

    /// Injecting a forbidden sequence into a valid name makes it invalid.
    #[test]
    fn ref_names_with_forbidden_sequences_rejected(
        name in valid_ref_name(),
        bad in prop::sample::select(vec![
            "..", "@{", "//", " ", "~", "^", ":", "?", "*", "[", "\\", "\t",
        ]),
    ) {
        let poisoned = format!("{name}{bad}x");
        prop_assert!(RefName::new(poisoned).is_err());
    }

    /// Ref files live directly under the prefix and map back to the same name.
    #[test]
    fn ref_paths_stay_under_prefix(
        prefix in "[a-z]{1,8}(/[a-z]{1,8}){0,2}",
        name in valid_ref_name(),
    ) {
        let layout = RemoteLayout::new(&prefix);
        let refname = RefName::new(&name).unwrap();

        let path = layout.ref_path(&refname);
        prop_assert_eq!(&path, &format!("{prefix}/{name}"));

        let relative = path.strip_prefix(&format!("{}/", layout.refs_dir())).unwrap();
        prop_assert_eq!(layout.ref_name_from_listing(relative), Some(refname.clone()));

        let lock = layout.ref_lock_path(&refname);
        prop_assert!(lock.starts_with(&path));
        let lock_relative = lock.strip_prefix(&format!("{}/", layout.refs_dir())).unwrap();
        prop_assert_eq!(layout.ref_name_from_listing(lock_relative), None);
    }

    /// Object paths fan out on the first two hex characters.
    #[test]
    fn object_path_fanout(prefix in "[a-z]{1,8}", oid_str in valid_oid_string()) {
        let layout = RemoteLayout::new(&prefix);
        let oid = Oid::new(&oid_str).unwrap();

        let path = layout.object_path(&oid);
        let expected = format!("{prefix}/objects/{}/{}", &oid_str[..2], &oid_str[2..]);
        prop_assert_eq!(path, expected);
    }

    /// Loose encoding inflates back to a header that declares the exact payload length.
    #[test]
    fn loose_objects_hash_consistently(
        kind in object_kind(),
        data in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let object = RawObject::new(kind, data);
        let encoded = object.encode_loose().unwrap();

        let decoded = RawObject::decode_loose(&encoded).unwrap();
        prop_assert_eq!(decoded.compute_oid(HashKind::Sha1), object.compute_oid(HashKind::Sha1));
        prop_assert!(decoded.verify(&object.compute_oid(HashKind::Sha256)).is_ok());
    }

    /// Any change to the payload is caught by verification.
    #[test]
    fn verification_detects_tampering(
        data in prop::collection::vec(any::<u8>(), 1..256),
        index in any::<prop::sample::Index>(),
    ) {
        let object = RawObject::new(ObjectKind::Blob, data);
        let oid = object.compute_oid(HashKind::Sha1);

        let mut tampered = object.clone();
        let i = index.index(tampered.data.len());
        tampered.data[i] ^= 0x01;
        prop_assert!(tampered.verify(&oid).is_err());
    }

    /// Arbitrary bytes never decode into an object with a mismatched length.
    #[test]
    fn decoding_garbage_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        if let Ok(object) = RawObject::decode_loose(&bytes) {
            prop_assert!(object.header().ends_with(b"\0"));
        }
    }

    /// Push lines parse into their parts regardless of the force marker.
    #[test]
    fn push_lines_parse(src in valid_ref_name(), dst in valid_ref_name(), force in any::<bool>()) {
        let line = format!("push {}{src}:{dst}", if force { "+" } else { "" });
        match Command::parse(&line).unwrap() {
            Command::Push(spec) => {
                prop_assert_eq!(spec.src, src);
                prop_assert_eq!(spec.dst, dst);
                prop_assert_eq!(spec.force, force);
            }
            other => prop_assert!(false, "unexpected command {:?}", other),
        }
    }

    /// Fetch lines carry a validated object id.
    #[test]
    fn fetch_lines_parse(oid_str in valid_oid_string(), name in valid_ref_name()) {
        let line = format!("fetch {} {name}", oid_str.to_uppercase());
        match Command::parse(&line).unwrap() {
            Command::Fetch(spec) => {
                prop_assert_eq!(spec.oid.as_str(), oid_str.as_str());
                prop_assert_eq!(spec.name, name);
            }
            other => prop_assert!(false, "unexpected command {:?}", other),
        }
    }

    /// The remote alias and path of a URL are recovered exactly.
    #[test]
    fn url_parts_recovered(
        remote in "[a-zA-Z0-9_-]{1,12}",
        path in "[a-z0-9]{1,8}(/[a-z0-9]{1,8}){0,3}",
    ) {
        let url = RemoteUrl::parse(&format!("rclone://{remote}/{path}")).unwrap();
        prop_assert_eq!(url.remote(), remote.as_str());
        prop_assert_eq!(url.path(), path.as_str());
        let layout = url.layout();
        prop_assert_eq!(layout.prefix(), path.as_str());
    }
}
