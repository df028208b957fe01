use serde::{Deserialize, Serialize};

/// Image id scheme understood by the imaging toolkit's WADO-URI loader
pub const WADO_URI_SCHEME: &str = "wadouri:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct StudyManifest {
    pub study: StudyInfo,
    #[serde(default)]
    pub series: Vec<Series>,
}

/// Study-level header shown above the series list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct StudyInfo {
    #[serde(default)]
    pub patient_name: String,
    pub study_description: Option<String>,
    pub study_date: Option<String>,
    pub modality: Option<String>,
    #[serde(default)]
    pub number_of_series: u32,
    #[serde(default)]
    pub number_of_instances: u32,
}

impl StudyInfo {
    /// "CT CHEST • 20240105", skipping whichever part is missing.
    pub fn subtitle(&self) -> String {
        [self.study_description.as_deref(), self.study_date.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" • ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Series {
    #[serde(rename = "seriesInstanceUID")]
    pub series_instance_uid: String,
    pub series_number: Option<i32>,
    pub series_description: Option<String>,
    pub modality: Option<String>,
    pub number_of_instances: Option<u32>,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

impl Series {
    /// Title for the series at position `index` in the manifest.
    pub fn title(&self, index: usize) -> String {
        match self.series_number {
            Some(number) => format!("Series {}", number),
            None => format!("Series {}", index + 1),
        }
    }

    pub fn description_display(&self) -> &str {
        self.series_description
            .as_deref()
            .unwrap_or("(no description)")
    }

    pub fn image_count(&self) -> usize {
        self.number_of_instances
            .map(|n| n as usize)
            .unwrap_or(self.instances.len())
    }

    /// Loader ids for every instance that has a file URL, in manifest order.
    pub fn image_ids(&self) -> Vec<String> {
        self.instances
            .iter()
            .filter_map(|inst| inst.file_url.as_deref())
            .filter(|url| !url.is_empty())
            .map(|url| format!("{}{}", WADO_URI_SCHEME, url))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    #[serde(rename = "sopInstanceUID")]
    pub sop_instance_uid: Option<String>,
    pub instance_number: Option<i32>,
    pub file_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "study": {
            "patientName": "DOE^JANE",
            "studyDescription": "CT CHEST",
            "studyDate": "20240105",
            "modality": "CT",
            "numberOfSeries": 2,
            "numberOfInstances": 3
        },
        "series": [
            {
                "seriesInstanceUID": "1.2.3.1",
                "seriesNumber": 3,
                "seriesDescription": "AXIAL",
                "modality": "CT",
                "numberOfInstances": 3,
                "instances": [
                    {"sopInstanceUID": "1.2.3.1.1", "instanceNumber": 1, "fileUrl": "http://pacs/f/1.dcm"},
                    {"sopInstanceUID": "1.2.3.1.2", "instanceNumber": 2, "fileUrl": null},
                    {"sopInstanceUID": "1.2.3.1.3", "instanceNumber": 3, "fileUrl": "http://pacs/f/3.dcm"}
                ]
            },
            {
                "seriesInstanceUID": "1.2.3.2",
                "instances": [{"fileUrl": ""}]
            }
        ]
    }"#;

    fn manifest() -> StudyManifest {
        serde_json::from_str(MANIFEST).expect("valid manifest")
    }

    #[test]
    fn test_parse_manifest() {
        let m = manifest();
        assert_eq!(m.study.patient_name, "DOE^JANE");
        assert_eq!(m.study.subtitle(), "CT CHEST • 20240105");
        assert_eq!(m.series.len(), 2);
        assert_eq!(m.series[0].series_instance_uid, "1.2.3.1");
        assert_eq!(m.series[1].modality, None);
    }

    #[test]
    fn test_series_display() {
        let m = manifest();
        assert_eq!(m.series[0].title(0), "Series 3");
        assert_eq!(m.series[1].title(1), "Series 2");
        assert_eq!(m.series[0].description_display(), "AXIAL");
        assert_eq!(m.series[1].description_display(), "(no description)");
        assert_eq!(m.series[0].image_count(), 3);
        assert_eq!(m.series[1].image_count(), 1);
    }

    #[test]
    fn test_image_ids_skip_missing_urls() {
        let m = manifest();
        assert_eq!(
            m.series[0].image_ids(),
            vec!["wadouri:http://pacs/f/1.dcm", "wadouri:http://pacs/f/3.dcm"]
        );
        assert!(m.series[1].image_ids().is_empty());
    }

    #[test]
    fn test_subtitle_with_missing_parts() {
        let mut info = manifest().study;
        info.study_description = None;
        assert_eq!(info.subtitle(), "20240105");
        info.study_date = None;
        assert_eq!(info.subtitle(), "");
    }
}
