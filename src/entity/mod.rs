pub mod branches;
pub mod device_roles;
pub mod device_types;
pub mod devices;
pub mod ingestion_issues;
pub mod ingestions;
pub mod interfaces;
pub mod jobs;
pub mod locations;
pub mod manufacturers;
pub mod object_changes;
pub mod relationship_fields;
pub mod sites;
pub mod snapshots;
pub mod sources;
pub mod syncs;
pub mod transform_fields;
pub mod transform_map_groups;
pub mod transform_maps;
