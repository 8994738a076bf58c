//! Unit tests for the identity rewriter

#[cfg(test)]
mod tests {
    use crate::identity::*;
    use crds::{CapturedVirtualMachine, TemplateFilters, VirtualMachineCloneSpec, ObjectReference};
    use std::collections::BTreeMap;

    fn captured_vm() -> CapturedVirtualMachine {
        serde_json::from_value(serde_json::json!({
            "metadata": {
                "name": "vm-a",
                "labels": {"key1": "value1", "key2": "value2", "kubevirt.io/vm": "vm-a"},
                "annotations": {"key1": "value1", "key2": "value2"}
            },
            "spec": {
                "runStrategy": "Halted",
                "instancetype": {"kind": "VirtualMachineInstancetype", "name": "small", "revisionName": "vm-a-small-1"},
                "preference": {"kind": "VirtualMachinePreference", "name": "fedora", "revisionName": "vm-a-fedora-1"},
                "template": {
                    "metadata": {"labels": {"key1": "value1", "key2": "value2"}, "annotations": {"key1": "value1"}},
                    "spec": {
                        "domain": {
                            "devices": {
                                "interfaces": [
                                    {"name": "eth0", "masquerade": {}, "macAddress": "02:00:00:00:00:01"},
                                    {"name": "eth1", "bridge": {}, "macAddress": "02:00:00:00:00:02"}
                                ]
                            },
                            "firmware": {"uuid": "fake-uuid", "serial": "source-serial"}
                        },
                        "volumes": [{"name": "rootdisk", "dataVolume": {"name": "dv-root"}}]
                    }
                }
            }
        }))
        .unwrap()
    }

    fn clone_spec() -> VirtualMachineCloneSpec {
        VirtualMachineCloneSpec {
            source: ObjectReference::virtual_machine("vm-a"),
            target: Some(ObjectReference::virtual_machine("vm-b")),
            label_filters: Vec::new(),
            annotation_filters: Vec::new(),
            template: TemplateFilters::default(),
            new_mac_addresses: BTreeMap::new(),
            new_sm_bios_serial: None,
        }
    }

    fn overrides<'a>() -> Overrides<'a> {
        Overrides {
            firmware_uuid: firmware_uuid("uid-1", "vm-b"),
            instancetype_revision: Some("vm-b-instancetype-uid-1".to_string()),
            preference_revision: Some("vm-b-preference-uid-1".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_firmware_uuid_is_stable_and_distinct() {
        assert_eq!(firmware_uuid("uid-1", "vm-b"), firmware_uuid("uid-1", "vm-b"));
        assert_ne!(firmware_uuid("uid-1", "vm-b"), firmware_uuid("uid-2", "vm-b"));
        assert!(uuid::Uuid::parse_str(&firmware_uuid("uid-1", "vm-b")).is_ok());
    }

    #[test]
    fn test_default_rewrite_keeps_macs_and_serial() {
        let source = captured_vm();
        let target = rewrite_spec(&source.spec, &overrides());

        assert_eq!(target.interfaces(), source.spec.interfaces());
        assert_eq!(
            target.firmware().and_then(|f| f.serial.as_deref()),
            Some("source-serial")
        );
        assert_eq!(target.run_strategy, source.spec.run_strategy);
        assert_eq!(target.template.spec.volumes, source.spec.template.spec.volumes);
    }

    #[test]
    fn test_firmware_uuid_always_differs_from_source() {
        let source = captured_vm();
        let target = rewrite_spec(&source.spec, &overrides());
        let source_uuid = source.spec.firmware().and_then(|f| f.uuid.clone());
        let target_uuid = target.firmware().and_then(|f| f.uuid.clone());
        assert!(target_uuid.is_some());
        assert_ne!(target_uuid, source_uuid);
    }

    #[test]
    fn test_absent_firmware_uuid_stays_absent() {
        let mut source = captured_vm();
        source.spec.template.spec.domain.firmware = None;
        let target = rewrite_spec(&source.spec, &overrides());
        assert!(target.firmware().is_none());
    }

    #[test]
    fn test_mac_override_only_touches_named_interface() {
        let source = captured_vm();
        let macs = BTreeMap::from([("eth0".to_string(), "BE-AD-00-00-BE-04".to_string())]);
        let target = rewrite_spec(
            &source.spec,
            &Overrides {
                mac_addresses: Some(&macs),
                ..overrides()
            },
        );

        let interfaces = target.interfaces();
        assert_eq!(interfaces[0].mac_address.as_deref(), Some("BE-AD-00-00-BE-04"));
        assert_ne!(interfaces[0].mac_address, source.spec.interfaces()[0].mac_address);
        assert_eq!(interfaces[1], source.spec.interfaces()[1]);

        // Everything except the MAC is unchanged
        let mut without_mac = target.clone();
        without_mac.template.spec.domain.devices.interfaces[0].mac_address =
            source.spec.interfaces()[0].mac_address.clone();
        assert_eq!(
            without_mac.template.spec.domain.devices,
            source.spec.template.spec.domain.devices
        );
    }

    #[test]
    fn test_serial_override() {
        let source = captured_vm();
        let target = rewrite_spec(
            &source.spec,
            &Overrides {
                serial: Some("target-serial"),
                ..overrides()
            },
        );
        assert_eq!(
            target.firmware().and_then(|f| f.serial.as_deref()),
            Some("target-serial")
        );

        // A serial override creates the firmware block when the source has none
        let mut bare = captured_vm();
        bare.spec.template.spec.domain.firmware = None;
        let target = rewrite_spec(
            &bare.spec,
            &Overrides {
                serial: Some("target-serial"),
                ..overrides()
            },
        );
        let firmware = target.firmware().unwrap();
        assert_eq!(firmware.serial.as_deref(), Some("target-serial"));
        assert!(firmware.uuid.is_none());
    }

    #[test]
    fn test_revision_names_are_replaced() {
        let source = captured_vm();
        let target = rewrite_spec(&source.spec, &overrides());
        let instancetype = target.instancetype.unwrap();
        let preference = target.preference.unwrap();
        assert_eq!(instancetype.revision_name.as_deref(), Some("vm-b-instancetype-uid-1"));
        assert_eq!(preference.revision_name.as_deref(), Some("vm-b-preference-uid-1"));
        assert_eq!(instancetype.name.as_deref(), Some("small"));

        // Without a copied revision the source revision is dropped, never shared
        let target = rewrite_spec(
            &source.spec,
            &Overrides {
                instancetype_revision: None,
                ..overrides()
            },
        );
        assert!(target.instancetype.unwrap().revision_name.is_none());
    }

    #[test]
    fn test_build_target_filters_metadata() {
        let source = captured_vm();
        let mut spec = clone_spec();
        spec.label_filters = vec!["*".to_string(), "!key2".to_string()];
        spec.annotation_filters = vec!["key1".to_string()];
        spec.template = TemplateFilters {
            label_filters: vec!["*".to_string(), "!key2".to_string()],
            annotation_filters: vec!["key1".to_string()],
        };

        let target = build_target(&source, &spec, "vm-b", &overrides());
        let labels = target.metadata.labels.unwrap();
        assert_eq!(labels.get("key1").map(String::as_str), Some("value1"));
        assert!(!labels.contains_key("key2"));
        assert!(!labels.contains_key("kubevirt.io/vm"));
        let annotations = target.metadata.annotations.unwrap();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations.get("key1").map(String::as_str), Some("value1"));

        let template_meta = target.spec.template.metadata.unwrap();
        assert!(!template_meta.labels.unwrap().contains_key("key2"));
        assert_eq!(template_meta.annotations.unwrap().len(), 1);
        assert_eq!(target.metadata.name.as_deref(), Some("vm-b"));
    }

    #[test]
    fn test_build_target_without_filters_copies_user_metadata() {
        let source = captured_vm();
        let target = build_target(&source, &clone_spec(), "vm-b", &overrides());
        let labels = target.metadata.labels.unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(target.metadata.annotations, source.metadata.annotations);
        assert_eq!(target.spec.template.metadata, source.spec.template.metadata);
    }

    #[test]
    fn test_restore_patches_reproduce_target() {
        let source = captured_vm();
        let macs = BTreeMap::from([("eth0".to_string(), "BE-AD-00-00-BE-04".to_string())]);
        let mut spec = clone_spec();
        spec.label_filters = vec!["key1".to_string()];
        let target = build_target(
            &source,
            &spec,
            "vm-b",
            &Overrides {
                mac_addresses: Some(&macs),
                serial: Some("target-serial"),
                ..overrides()
            },
        );

        let patches = restore_patches(&source, &target).unwrap();
        assert!(!patches.is_empty());
        assert!(patches.iter().all(|p| !p.contains("/metadata/name")));

        let mut document = serde_json::to_value(&source).unwrap();
        for raw in &patches {
            let operation: json_patch::PatchOperation = serde_json::from_str(raw).unwrap();
            json_patch::patch(&mut document, &[operation]).unwrap();
        }
        let patched: CapturedVirtualMachine = serde_json::from_value(document).unwrap();
        assert_eq!(patched.spec, target.spec);
        assert_eq!(patched.metadata.name, source.metadata.name);
        assert_eq!(patched.metadata.labels, target.metadata.labels);
    }

    #[test]
    fn test_identical_vms_need_no_patches() {
        let source = captured_vm();
        assert!(restore_patches(&source, &source).unwrap().is_empty());
    }
}
