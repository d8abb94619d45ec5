use crate::records::UploadRecord;
use crate::remote::NewObservation;

/// Tags attached to a new observation. The uniqueness tag is always present.
pub fn build_tags(record: &UploadRecord, source_tag: &str) -> Vec<String> {
    let mut tags = Vec::new();
    if !source_tag.is_empty() {
        tags.push(format!("emi_source:{}", source_tag));
    }
    tags.push(record.unique_tag());
    if let Some(ref code) = record.project_code {
        tags.push(format!("emi_project_code:{}", code));
    }
    tags
}

/// "Original observer: @handle", or the plain name when no handle is known.
pub fn build_description(record: &UploadRecord) -> Option<String> {
    if let Some(ref handle) = record.collector_inat {
        let handle = handle.trim_start_matches('@');
        if !handle.is_empty() {
            return Some(format!("Original observer: @{}", handle));
        }
    }
    record
        .collector_name
        .as_ref()
        .map(|name| format!("Original observer: {}", name))
}

pub fn build_observation(
    record: &UploadRecord,
    location: (f64, f64),
    source_tag: &str,
) -> NewObservation {
    NewObservation {
        species_guess: record.taxon_name.clone(),
        observed_on: record.observed_on.clone(),
        latitude: location.0,
        longitude: location.1,
        tag_list: build_tags(record, source_tag).join(","),
        description: build_description(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Wildness;

    fn record() -> UploadRecord {
        UploadRecord {
            sample_id: "dbgi_009910".to_string(),
            taxon_name: Some("Gentiana lutea".to_string()),
            observed_on: Some("2023-07-14T00:00:00".to_string()),
            raw_x: Some(7.1),
            raw_y: Some(46.0),
            location: Some((46.0, 7.1)),
            upload: true,
            wildness: Wildness::Wild,
            collector_inat: Some("@@ifedenat25".to_string()),
            collector_name: Some("I. Fedenat".to_string()),
            project_code: None,
        }
    }

    #[test]
    fn test_tags() {
        let mut r = record();
        assert_eq!(
            build_tags(&r, "JBC"),
            vec!["emi_source:JBC", "emi_external_id:dbgi_009910"]
        );

        r.project_code = Some("P12".to_string());
        assert_eq!(
            build_tags(&r, "").join(","),
            "emi_external_id:dbgi_009910,emi_project_code:P12"
        );
    }

    #[test]
    fn test_description_single_at() {
        assert_eq!(
            build_description(&record()).as_deref(),
            Some("Original observer: @ifedenat25")
        );

        let mut r = record();
        r.collector_inat = None;
        assert_eq!(
            build_description(&r).as_deref(),
            Some("Original observer: I. Fedenat")
        );

        r.collector_name = None;
        assert_eq!(build_description(&r), None);
    }

    #[test]
    fn test_observation_uses_resolved_location() {
        let obs = build_observation(&record(), (46.5, 7.25), "JBC");
        assert_eq!(obs.latitude, 46.5);
        assert_eq!(obs.longitude, 7.25);
        assert!(obs.tag_list.contains("emi_external_id:dbgi_009910"));
        assert_eq!(obs.species_guess.as_deref(), Some("Gentiana lutea"));
    }
}
